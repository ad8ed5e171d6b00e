//! 服务器启动与装配
//!
//! 加载配置 -> 构造存储 / L2 / 核心原语 -> 可选加载持久化的布隆过滤器
//! -> 启动点击消费者 -> 运行 HTTP 服务 -> 优雅关闭时刷缓冲并持久化过滤器。

use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use tracing::{error, info, warn};

use crate::analytics::{
    ClickBatcher, ClickConsumer, ClickQueue, LogDeadLetterSink, MemoryClickQueue, RedisClickQueue,
};
use crate::api;
use crate::api::middleware::{RateLimitMiddleware, RateLimiter};
use crate::cache::{
    SharedCache, TieredCache,
    register::{debug_cache_registry, get_shared_cache_plugin},
};
use crate::config::{Config, get_config};
use crate::core::{BloomFilter, CircuitBreaker};
use crate::errors::{ResilinkError, Result};
use crate::service::Shortener;
use crate::storage::{UrlStore, build_store};

async fn build_shared_cache(config: &Config) -> Result<Arc<dyn SharedCache>> {
    debug_cache_registry();
    let name = &config.cache.l2_plugin;
    let constructor = get_shared_cache_plugin(name).ok_or_else(|| {
        ResilinkError::config(format!("unknown shared cache plugin: {}", name))
    })?;
    let cache = constructor().await?;
    info!("Using shared cache plugin: {}", name);
    Ok(Arc::from(cache))
}

fn build_bloom(config: &Config) -> Result<Arc<BloomFilter>> {
    if let Some(ref path) = config.bloom.persist_path
        && std::path::Path::new(path).exists()
    {
        match std::fs::read(path).map_err(ResilinkError::from).and_then(
            |data| BloomFilter::deserialize(&data),
        ) {
            Ok(filter) => {
                info!(
                    "Loaded bloom filter from {} (fill ratio {:.4})",
                    path,
                    filter.fill_ratio()
                );
                return Ok(Arc::new(filter));
            }
            Err(e) => {
                warn!("Failed to load bloom filter from {}: {}, rebuilding", path, e);
            }
        }
    }
    Ok(Arc::new(BloomFilter::new(
        config.bloom.capacity,
        config.bloom.fp_rate,
        config.bloom.counting,
    )?))
}

fn persist_bloom(config: &Config, bloom: &BloomFilter) {
    if let Some(ref path) = config.bloom.persist_path {
        match std::fs::write(path, bloom.serialize()) {
            Ok(_) => info!("Persisted bloom filter to {}", path),
            Err(e) => error!("Failed to persist bloom filter to {}: {}", path, e),
        }
    }
}

fn build_click_queue(config: &Config) -> Result<Arc<dyn ClickQueue>> {
    match config.analytics.queue_backend.as_str() {
        "memory" => Ok(Arc::new(MemoryClickQueue::new())),
        "redis" => Ok(Arc::new(RedisClickQueue::from_config(&config.analytics)?)),
        other => Err(ResilinkError::config(format!(
            "unknown click queue backend: {}",
            other
        ))),
    }
}

pub async fn run() -> Result<()> {
    let config = get_config();

    let store: Arc<dyn UrlStore> = build_store(&config.storage)?;
    info!("Using storage backend: {}", config.storage.backend);

    let l2 = build_shared_cache(config).await?;
    let breaker = Arc::new(CircuitBreaker::from_config(&config.breaker));
    let bloom = build_bloom(config)?;

    let cache = Arc::new(TieredCache::new(
        config.cache.l1_capacity,
        Arc::clone(&l2),
        Arc::clone(&store),
        Arc::clone(&breaker),
        config.cache.l2_ttl,
        config.cache.enabled,
    ));

    let queue = build_click_queue(config)?;
    let batcher = Arc::new(ClickBatcher::new(
        Arc::clone(&queue),
        config.analytics.batch_size,
        Duration::from_millis(config.analytics.flush_interval_ms),
    ));

    // 点击消费者随服务一起运行；致命退化只影响分析，不影响跳转
    if config.analytics.enabled {
        let consumer = ClickConsumer::from_config(
            &config.analytics,
            Arc::clone(&queue),
            Arc::clone(&store),
            Arc::new(LogDeadLetterSink),
        );
        tokio::spawn(async move {
            if let Err(e) = consumer.run().await {
                error!("Click consumer stopped: {}", e);
            }
        });
        info!(
            "Click consumer started (prefetch {}, max retries {})",
            config.analytics.prefetch, config.analytics.max_retries
        );
    }

    let shortener = Arc::new(Shortener::new(
        Arc::clone(&store),
        cache,
        Arc::clone(&breaker),
        Arc::clone(&bloom),
        Arc::clone(&batcher),
        config.server.base_url.clone(),
        config.server.random_code_length,
        config.bloom.read_path_filter,
    ));

    let rate_limiter = if config.rate_limit.enabled {
        RateLimiter::new(
            config.rate_limit.max_requests,
            Duration::from_secs(config.rate_limit.window_secs),
        )
    } else {
        RateLimiter::disabled()
    };

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    info!("Starting server at http://{}", bind_address);

    let shortener_data = web::Data::new(Arc::clone(&shortener));
    let store_data = web::Data::new(Arc::clone(&store));
    let breaker_data = web::Data::new(Arc::clone(&breaker));
    let bloom_data = web::Data::new(Arc::clone(&bloom));

    HttpServer::new(move || {
        App::new()
            .app_data(shortener_data.clone())
            .app_data(store_data.clone())
            .app_data(breaker_data.clone())
            .app_data(bloom_data.clone())
            .wrap(RateLimitMiddleware::new(Arc::clone(&rate_limiter)))
            .wrap(Cors::permissive())
            .configure(api::configure_routes)
    })
    .workers(config.server.cpu_count)
    .bind(&bind_address)?
    .run()
    .await?;

    // 优雅关闭：刷掉未发布的点击，持久化过滤器
    batcher.flush().await;
    persist_bloom(config, &bloom);
    info!("Server shut down cleanly");

    Ok(())
}
