//! IIIF image server.
//!
//! This binary starts the HTTP server and configures all components.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iiif_image_server::{
    config::{ServeConfig, SourceKind},
    derivative::{DerivativeCache, Hooks, ImageService, TracingObserver},
    server::{create_router, RouterConfig, IMAGE_API_PREFIX},
    source::{
        create_s3_client, DirectoryResolver, FsLoader, IdentifierResolver, PrefixResolver,
        S3Loader, SourceLoader, SourceRegistry,
    },
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = ServeConfig::parse();
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("IIIF image server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!(
        "  Cache: {} derivatives, {}MB, ttl {}s, {} sources",
        config.cache_entries,
        config.cache_size / (1024 * 1024),
        config.cache_ttl,
        config.cache_sources
    );
    info!(
        "  Pipeline: jpeg quality {}, max dimension {}, timeout {}s",
        config.jpeg_quality, config.max_dimension, config.request_timeout
    );

    match config.source {
        SourceKind::Fs => {
            // validate() guarantees the directory is set
            let Some(root) = config.root_dir.clone() else {
                return ExitCode::FAILURE;
            };
            info!("  Source: directory {}", root.display());
            if !root.is_dir() {
                error!("  {} is not a directory", root.display());
                return ExitCode::FAILURE;
            }

            let resolver = DirectoryResolver::with_extensions(root, config.extensions());
            serve(config, Arc::new(resolver), FsLoader::new()).await
        }
        SourceKind::S3 => {
            let bucket = config.s3_bucket.clone().unwrap_or_default();
            info!("  Source: S3 bucket {}", bucket);
            if let Some(ref prefix) = config.s3_prefix {
                info!("  S3 prefix: {}", prefix);
            }
            if let Some(ref endpoint) = config.s3_endpoint {
                info!("  S3 endpoint: {}", endpoint);
            }
            info!("  S3 region: {}", config.s3_region);

            let client =
                create_s3_client(config.s3_endpoint.as_deref(), &config.s3_region).await;

            info!("Connecting to S3...");
            if let Err(e) = client.head_bucket().bucket(&bucket).send().await {
                error!("  Failed to reach bucket '{}': {}", bucket, e);
                error!("  Please check:");
                error!("    - Your AWS credentials are configured correctly");
                error!("    - The bucket exists and is accessible");
                error!("    - The S3 endpoint is correct (if using MinIO/custom S3)");
                return ExitCode::FAILURE;
            }
            info!("  Connected successfully");

            let resolver = PrefixResolver::new(config.s3_prefix.clone());
            serve(config, Arc::new(resolver), S3Loader::new(client, bucket)).await
        }
    }
}

/// Assemble the pipeline for a concrete loader and run the server.
async fn serve<L>(
    config: ServeConfig,
    resolver: Arc<dyn IdentifierResolver>,
    loader: L,
) -> ExitCode
where
    L: SourceLoader + 'static,
{
    let registry = SourceRegistry::with_capacity(resolver, loader, config.cache_sources);
    let cache = DerivativeCache::with_limits(
        config.cache_ttl(),
        config.cache_size,
        config.cache_entries,
    );
    let hooks = Hooks::new().with_observer(TracingObserver);

    let service = Arc::new(
        ImageService::new(registry, Arc::new(cache))
            .with_options(config.service_options())
            .with_hooks(hooks),
    );

    spawn_sweeper(Arc::clone(&service), config.sweep_interval());

    let router = create_router(service, build_router_config(&config));
    let addr = config.bind_address();

    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl http://{}{}/v2/<identifier>/info.json", addr, IMAGE_API_PREFIX);
    info!(
        "    curl http://{}{}/v2/<identifier>/full/full/0/default.jpg",
        addr, IMAGE_API_PREFIX
    );
    info!("────────────────────────────────────────────────────────────────");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Periodically drop expired derivatives so idle entries release memory.
fn spawn_sweeper<L>(service: Arc<ImageService<L>>, interval: Duration)
where
    L: SourceLoader + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match service.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "Swept expired derivatives"),
                Err(e) => warn!(error = %e, "Derivative sweep failed"),
            }
        }
    });
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "iiif_image_server=debug,tower_http=debug"
    } else {
        "iiif_image_server=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new().with_cache_max_age(config.cache_max_age);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}
