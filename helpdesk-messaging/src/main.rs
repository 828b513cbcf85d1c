use std::sync::Arc;

use socketioxide::SocketIo;

use helpdesk_messaging::config::{AppConfig, StoreBackend};
use helpdesk_messaging::events::EventPublisher;
use helpdesk_messaging::realtime::RealtimeHub;
use helpdesk_messaging::storage::{AttachmentStorage, MinioAttachmentStorage};
use helpdesk_messaging::store::{MemoryStore, PgStore, Store};
use helpdesk_messaging::{routes, socket, AppState};
use helpdesk_shared::clients::db::create_pool;
use helpdesk_shared::clients::minio::MinioClient;
use helpdesk_shared::clients::rabbitmq::RabbitMQClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    helpdesk_shared::middleware::init_tracing("helpdesk-messaging");

    let config = AppConfig::load()?;
    let port = config.port;

    let metrics_handle = match helpdesk_shared::middleware::init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "prometheus recorder not installed");
            None
        }
    };

    let store: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Postgres => {
            let pool = create_pool(&config.database_url, config.database_pool_size)?;
            tracing::info!(pool_size = config.database_pool_size, "connected to PostgreSQL");
            Arc::new(PgStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store, data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // Downstream notification events are optional.
    let events = match &config.rabbitmq_url {
        Some(url) => Some(EventPublisher::new(RabbitMQClient::connect(url).await?)),
        None => {
            tracing::info!("rabbitmq_url not set, message events disabled");
            None
        }
    };

    let storage: Option<Arc<dyn AttachmentStorage>> = match &config.minio_endpoint {
        Some(endpoint) => {
            let client = MinioClient::new(
                endpoint,
                &config.minio_access_key,
                &config.minio_secret_key,
                &config.minio_bucket,
            )
            .await;
            Some(Arc::new(MinioAttachmentStorage::new(client)))
        }
        None => {
            tracing::info!("minio_endpoint not set, attachment uploads disabled");
            None
        }
    };

    let hub = RealtimeHub::new();
    let state = Arc::new(AppState::new(config, store, hub.clone(), events, storage, metrics_handle));

    let (sio_layer, io) = SocketIo::builder().build_layer();
    io.ns("/", {
        let state = state.clone();
        move |socket: socketioxide::extract::SocketRef| {
            let state = state.clone();
            async move {
                socket::on_connect_with_state(socket, state).await;
            }
        }
    });

    let app = routes::router(state).layer(sio_layer);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "helpdesk-messaging starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    hub.shutdown();
    tracing::info!("helpdesk-messaging stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown signal received");
}
