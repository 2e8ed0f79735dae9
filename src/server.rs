//! HTTP transport for the viewer
//!
//! - `GET /` serves the viewer page
//! - `GET /events` streams published observations as server-sent events
//! - `GET /config` describes the plotted fields and the history window

use axum::{
    Json, Router,
    extract::State,
    response::{
        Html,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use eyre::{Context, Result};
use log::{info, warn};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::publish::{Hub, StreamEvent};
use crate::spec::{Field, Spec};

const VIEWER_PAGE: &str = include_str!("index.html");

/// What the viewer needs to lay out its plots
#[derive(Debug, Clone, Serialize)]
pub struct ViewerConfig {
    pub steps: usize,
    pub fields: Vec<Field>,
}

impl ViewerConfig {
    pub fn new(steps: usize, specs: &[Spec]) -> Self {
        Self {
            steps,
            fields: specs.iter().flat_map(|spec| spec.fields.iter().cloned()).collect(),
        }
    }
}

/// State shared with axum handlers
#[derive(Clone)]
pub struct ServerState {
    pub hub: Hub,
    pub viewer: Arc<ViewerConfig>,
    pub shutdown: CancellationToken,
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/events", get(handle_events))
        .route("/config", get(handle_config))
        .with_state(state)
}

/// Serve until `shutdown` fires; open event streams end at the same time
pub async fn serve(listener: TcpListener, state: ServerState) -> Result<()> {
    let shutdown = state.shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server failed")
}

async fn handle_index() -> Html<&'static str> {
    Html(VIEWER_PAGE)
}

async fn handle_config(State(state): State<ServerState>) -> Json<ViewerConfig> {
    Json(state.viewer.as_ref().clone())
}

async fn handle_events(
    State(state): State<ServerState>,
) -> Sse<impl futures_util::Stream<Item = std::result::Result<Event, Infallible>>> {
    let (backlog, mut rx) = state.hub.subscribe();
    let shutdown = state.shutdown.clone();
    info!("Subscriber attached, replaying {} events", backlog.len());

    let stream = async_stream::stream! {
        for event in backlog {
            yield Ok(to_sse(event));
        }

        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = rx.recv() => received,
            };
            match received {
                Ok(event) => yield Ok(to_sse(event)),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!("Subscriber lagged by {} events", count);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_sse(event: StreamEvent) -> Event {
    Event::default().id(event.id.to_string()).data(event.data)
}
