use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::{signal, sync::mpsc};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use equipment_tracker as api;
use api::notifications::{ChannelPublisher, InMemoryChannelPublisher, RedisChannelPublisher};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Init events; the processor writes the activity log
    let (event_tx, event_rx) = mpsc::channel(cfg.event_buffer_size);
    let event_sender = api::events::EventSender::new(event_tx);
    tokio::spawn(api::events::process_events(event_rx, db_arc.clone()));

    let publisher = build_publisher(&cfg).await;

    let services = api::handlers::AppServices::new(
        db_arc.clone(),
        event_sender.clone(),
        publisher,
        &cfg,
    );

    let app_state = api::AppState {
        db: db_arc,
        config: cfg.clone(),
        event_sender,
        services,
    };

    let cors_layer = if cfg.is_development() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new().allow_methods(Any).allow_headers(Any)
    };

    let app = api::app_router(app_state)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(api::tracing::request_id_middleware));

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.host, cfg.port))?;
    info!("equipment-tracker listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Live notification transport: Redis pub/sub when configured, otherwise the
/// in-process broadcast hub
async fn build_publisher(cfg: &api::config::AppConfig) -> Arc<dyn ChannelPublisher> {
    if !cfg.uses_redis_realtime() {
        info!("Using in-memory realtime publisher");
        return Arc::new(InMemoryChannelPublisher::new());
    }

    let connected = match redis::Client::open(cfg.redis_url.clone()) {
        Ok(client) => RedisChannelPublisher::connect(client).await,
        Err(e) => Err(e.into()),
    };
    match connected {
        Ok(publisher) => {
            info!("Using Redis realtime publisher");
            Arc::new(publisher)
        }
        Err(err) => {
            warn!(
                "Failed to initialize Redis publisher (falling back to in-memory): {}",
                err
            );
            Arc::new(InMemoryChannelPublisher::new())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
