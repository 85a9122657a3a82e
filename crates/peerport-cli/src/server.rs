//! HTTP and WebSocket endpoints

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use peerport::{AdapterConfig, Event, LoopbackNetwork, PeerNetwork};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::session::{run_session, Frame};

#[derive(Clone)]
pub struct AppState {
    pub network: LoopbackNetwork,
    pub config: AdapterConfig,
    next_client: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(network: LoopbackNetwork, config: AdapterConfig) -> Self {
        Self {
            network,
            config,
            next_client: Arc::new(AtomicU64::new(1)),
        }
    }
}

pub struct PeerportServer {
    state: AppState,
    addr: String,
}

impl PeerportServer {
    pub fn new(addr: String) -> Self {
        Self {
            state: AppState::new(LoopbackNetwork::new(), AdapterConfig::default()),
            addr,
        }
    }

    pub fn with_adapter_config(mut self, config: AdapterConfig) -> Self {
        self.state.config = config;
        self
    }

    /// Share an existing network, e.g. to inspect it from tests
    pub fn with_network(mut self, network: LoopbackNetwork) -> Self {
        self.state.network = network;
        self
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_check))
            .route("/ws", get(ws_handler))
            .with_state(self.state.clone())
    }

    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(&self.addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.addr))?;
        self.run_on(listener).await
    }

    /// Serve on an already bound listener
    pub async fn run_on(self, listener: TcpListener) -> Result<()> {
        info!("Listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

async fn health_check() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler for /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a single WebSocket client
async fn handle_socket(socket: WebSocket, state: AppState) {
    let client = state.next_client.fetch_add(1, Ordering::Relaxed);
    debug!("Client {} connected", client);

    let (mut ws_tx, ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

    // Forward events to the socket as JSON text frames
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode {}: {}", event.tag(), e);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let frames = ws_rx.filter_map(|msg| {
        futures::future::ready(match msg {
            Ok(Message::Text(text)) => Some(Frame::Text(text)),
            Ok(Message::Binary(data)) => Some(Frame::Binary(data.len())),
            Ok(Message::Close(_)) => Some(Frame::Close),
            Ok(_) => None, // Ping/Pong handled by axum
            Err(e) => {
                warn!("WebSocket error: {}", e);
                Some(Frame::Close)
            }
        })
    });

    let network: Arc<dyn PeerNetwork> = Arc::new(state.network.clone());
    run_session(network, state.config.clone(), frames, tx).await;

    let _ = send_task.await;
    debug!("Client {} disconnected", client);
}
