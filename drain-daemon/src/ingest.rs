//! HTTP ingestion source.
//!
//! Every request to [`INGEST_PATH`], whatever its method, becomes exactly one
//! `Write` event carrying the full request body. The response only says the
//! record was queued; it never waits for the serializer to apply it.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::any;
use axum::Router;
use drain_core::Event;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{DaemonConfig, INGEST_PATH};
use crate::error::{io_err, DaemonError};

#[derive(Clone)]
struct IngestState {
    events: mpsc::Sender<Event>,
    max_body_bytes: usize,
}

/// Build the ingestion router.
pub fn router(events: mpsc::Sender<Event>, max_body_bytes: usize) -> Router {
    Router::new()
        .route(INGEST_PATH, any(ingest))
        .with_state(IngestState {
            events,
            max_body_bytes,
        })
}

async fn ingest(State(state): State<IngestState>, body: Body) -> StatusCode {
    // A body that can't be read in full is not forwarded at all, so a
    // truncated payload never becomes a record.
    let payload = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(payload) => payload,
        Err(err) => {
            tracing::error!(error = %err, "body read failed");
            return StatusCode::BAD_REQUEST;
        }
    };

    let bytes = payload.len();
    match state.events.send(Event::Write { payload }).await {
        Ok(()) => {
            tracing::trace!(bytes, "record queued");
            StatusCode::OK
        }
        Err(_) => {
            tracing::warn!(bytes, "event queue closed, record not queued");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

pub struct IngestServer {
    listener: TcpListener,
    router: Router,
}

impl IngestServer {
    /// Bind the listener. Nothing is accepted until [`serve`](Self::serve).
    pub async fn bind(
        config: &DaemonConfig,
        events: mpsc::Sender<Event>,
    ) -> Result<Self, DaemonError> {
        let address = config.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| DaemonError::Bind { address, source })?;

        Ok(Self {
            listener,
            router: router(events, config.max_body_bytes),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, DaemonError> {
        self.listener
            .local_addr()
            .map_err(|e| io_err("http listener", e))
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), DaemonError> {
        let address = self.local_addr()?;
        tracing::info!(%address, path = INGEST_PATH, "http ingestion listening");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| io_err("http listener", e))?;

        tracing::info!(%address, "http ingestion stopped");
        Ok(())
    }
}
