//! HTTP listener: WebSocket endpoint plus a health check.
//!
//! Each text frame on `/ws` carries one JSON client event; each outbound
//! event is sent as one text frame.

use std::future::Future;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::{net::TcpListener, select};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use super::ChatState;
use crate::{message::ClientEvent, registry::ConnectionId, transport::Outbox};

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    connections: usize,
    users: usize,
}

pub fn router(state: ChatState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves HTTP on `listener` until `shutdown` resolves, then closes every
/// open connection.
pub async fn serve<F>(listener: TcpListener, state: ChatState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("http listener shutting down");
            state.shutdown();
        })
        .await
        .context("http server failed")
}

async fn health_handler(State(state): State<ChatState>) -> impl IntoResponse {
    Json(Health {
        status: "ok",
        connections: state.hub().connection_count(),
        users: state.relay().registry().len().await,
    })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ChatState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ChatState) {
    let (id, outbox) = state.open();
    info!(connection = %id, "websocket connection opened");

    if let Err(err) = run_session(socket, &state, &id, outbox).await {
        warn!(connection = %id, error = ?err, "websocket session ended with error");
    }

    state.close(&id).await;
    info!(connection = %id, "websocket connection closed");
}

async fn run_session(
    socket: WebSocket,
    state: &ChatState,
    id: &ConnectionId,
    mut outbox: Outbox,
) -> Result<()> {
    let (mut sink, mut stream) = socket.split();

    loop {
        select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => handle_text(&text, state, id).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(err).context("websocket read failed"),
            },
            event = outbox.recv() => {
                let Some(event) = event else {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                let encoded = serde_json::to_string(&event)?;
                if let Err(err) = sink.send(Message::Text(encoded)).await {
                    debug!(?err, "failed to deliver event to connection");
                    break;
                }
            }
        }
    }

    Ok(())
}

async fn handle_text(text: &str, state: &ChatState, id: &ConnectionId) {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => state.relay().handle(id, event).await,
        Err(err) => warn!(connection = %id, error = %err, "ignoring malformed frame"),
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::relay::RelaySettings;

    #[tokio::test]
    async fn health_reports_connections_and_users() {
        let state = ChatState::new(RelaySettings::default());
        let (id, _outbox) = state.open();
        let (_idle, _idle_outbox) = state.open();
        state.relay().join(&id, "alice".into(), "r1".into()).await;

        let response = router(state)
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body: Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body, json!({ "status": "ok", "connections": 2, "users": 1 }));
    }
}
