//! Pocket Cache walkthrough
//!
//! Run with `cargo run --example basic_usage`. Set `RUST_LOG=pocket_cache=debug`
//! to see cache hits and misses.

use std::time::Duration;

use anyhow::Context;
use pocket_cache::{
    AsyncCache, Cache, CacheConfig, CallArgs, FileSystemBackend, JsonSerializer, MemoryBackend,
    MsgPackSerializer, RedisBackend, Ttl,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Profile {
    id: u64,
    name: String,
    tags: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pocket_cache=info,basic_usage=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CacheConfig::from_env();
    info!(
        "Configuration loaded: default_ttl={}s, sweep_interval={}ms, cache_dir={}",
        config.default_ttl,
        config.sweep_interval_ms,
        config.cache_dir.display()
    );

    // == Memory backend ==
    let cache = Cache::from_config(
        MemoryBackend::from_config(&config),
        JsonSerializer::new(),
        &config,
    );
    cache.set("greeting", "Hello, World!")?;
    cache.set_with_ttl("short_lived", &[1, 2, 3], Duration::from_millis(200))?;
    info!("greeting = {:?}", cache.get::<String>("greeting")?);

    tokio::time::sleep(Duration::from_millis(300)).await;
    info!("short_lived after expiry = {:?}", cache.get::<Vec<i32>>("short_lived")?);

    // == Memoization ==
    let slow_square = cache
        .memoize("demo.slow_square", |(x,): (u64,)| {
            std::thread::sleep(Duration::from_millis(100));
            x * x
        })
        .ttl(Ttl::from_secs(60)?);
    info!("first call = {}", slow_square.call((12,)));
    info!("second call (cached) = {}", slow_square.call((12,)));

    let describe = cache.memoize("demo.describe", |args: CallArgs| {
        args.canonical().unwrap_or_default()
    });
    let args = CallArgs::new().arg("report").kwarg("year", &2024).kwarg("draft", &false);
    info!("describe = {}", describe.call(args));

    // == Filesystem backend ==
    let files = FileSystemBackend::from_config(&config)
        .with_context(|| format!("opening cache dir {}", config.cache_dir.display()))?;
    let disk = Cache::new(files, MsgPackSerializer::new(), config.default_ttl());
    let profile = Profile {
        id: 7,
        name: "Ada".to_string(),
        tags: vec!["admin".to_string()],
    };
    disk.set("profile:7", &profile)?;
    info!("profile from disk = {:?}", disk.get::<Profile>("profile:7")?);
    disk.delete("profile:7")?;

    // == Async facade ==
    let async_cache = AsyncCache::new(
        MemoryBackend::new(),
        JsonSerializer::new(),
        config.default_ttl(),
    )
    .with_timeout(Duration::from_millis(500));
    async_cache.set("counter", &1u32).await?;
    info!("async counter = {:?}", async_cache.get::<u32>("counter").await?);

    // == Redis backend ==
    // Needs a running server, so failures are reported and skipped
    let redis = RedisBackend::from_config(&config)?;
    let remote = AsyncCache::from_config(redis, JsonSerializer::new(), &config)
        .with_timeout(config.op_timeout().unwrap_or(Duration::from_secs(1)));
    match remote.set("greeting", "Hello from Redis").await {
        Ok(()) => info!("redis greeting = {:?}", remote.get::<String>("greeting").await?),
        Err(e) => warn!("Skipping redis example: {}", e),
    }

    let stats = cache.backend().stats();
    info!(
        "memory stats: hits={}, misses={}, hit_rate={:.2}",
        stats.hits,
        stats.misses,
        stats.hit_rate()
    );

    Ok(())
}
