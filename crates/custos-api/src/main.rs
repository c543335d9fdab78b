//! Custos audit API server.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use custos_api::server::{self, AppState};
use custos_crypto::FieldCodec;
use custos_recorder::RetryQueue;
use custos_store::{
    HttpRemoteSink, InMemoryAlertStore, InMemoryAuditStore, InMemoryRetryStore, JsonlAuditStore,
    JsonlRetryStore,
};
use custos_types::{AlertStore, AuditStore, RemoteSink, RetryStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let local: Arc<dyn AuditStore> = match std::env::var("CUSTOS_AUDIT_LOG") {
        Ok(path) => Arc::new(JsonlAuditStore::new(path)),
        Err(_) => Arc::new(InMemoryAuditStore::new()),
    };
    let retry_store: Arc<dyn RetryStore> = match std::env::var("CUSTOS_RETRY_LOG") {
        Ok(path) => Arc::new(JsonlRetryStore::new(path)),
        Err(_) => Arc::new(InMemoryRetryStore::new()),
    };
    let sink: Arc<dyn RemoteSink> = Arc::new(HttpRemoteSink::from_env());
    let alerts: Arc<dyn AlertStore> = Arc::new(InMemoryAlertStore::new());
    let retry = Arc::new(RetryQueue::new(retry_store, Arc::clone(&sink)));

    let codec = match std::env::var("CUSTOS_ENCRYPTION_KEY") {
        Ok(armored) => {
            let key = BASE64.decode(armored.trim())?;
            Some(FieldCodec::from_key_bytes(&key)?)
        }
        Err(_) => {
            tracing::warn!("CUSTOS_ENCRYPTION_KEY not set, snapshot fields stored in plaintext");
            None
        }
    };

    // Periodic redelivery of entries the remote sink rejected.
    let interval_secs: u64 = std::env::var("CUSTOS_RETRY_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(60);
    let retry_worker = Arc::clone(&retry);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tokio::time::Duration::from_secs(interval_secs));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let stats = retry_worker.retry_all().await;
            if stats.attempted > 0 {
                tracing::info!(
                    attempted = stats.attempted,
                    delivered = stats.delivered,
                    still_queued = stats.still_queued,
                    "retry pass finished"
                );
            }
        }
    });

    let state = Arc::new(AppState {
        local,
        sink,
        retry,
        alerts,
        codec,
    });
    let app = server::router(state);
    let addr: SocketAddr = std::env::var("CUSTOS_LISTEN")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()?;
    tracing::info!("Custos audit API listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        app.into_make_service(),
    )
    .await?;
    Ok(())
}
