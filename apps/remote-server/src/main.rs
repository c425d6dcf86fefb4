//! Streaming Remote Server
//!
//! Exposes the demo streaming software to remote controllers over
//! WebSocket, Content-Length framed TCP and (on Unix) a local socket.

mod config;
mod websocket;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{State, ws::WebSocketUpgrade},
    response::Response,
    routing::get,
};
use clap::Parser;
use net_transport::{
    FramedConnection, HandshakeOptions, SecureChannel, TransportError, framed_stream,
};
use remote_rpc::{DummySoftware, RpcServer};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{Instrument, Level, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::ServerConfig;

#[derive(Parser, Debug)]
#[command(name = "remote-server", about = "Streaming Remote server")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// State shared by every listener
#[derive(Clone)]
struct AppState {
    password: Arc<SecretString>,
    handshake: HandshakeOptions,
    server: RpcServer,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("remote_server=debug".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = ServerConfig::load(args.config.as_deref())?;
    debug!(?config, "Loaded configuration");

    let (password, generated) = config.resolve_password();
    if generated {
        info!(
            "No password configured, generated one for this run: {}",
            password.expose_secret()
        );
    }

    let state = AppState {
        password: Arc::new(password),
        handshake: HandshakeOptions {
            kdf: config.kdf.into(),
            timeout: Some(Duration::from_secs(config.handshake_timeout_secs)),
        },
        server: RpcServer::new(Arc::new(DummySoftware::demo())),
    };

    info!("Starting Streaming Remote Server");

    let mut listeners = JoinSet::new();
    if config.websocket_port != 0 {
        listeners.spawn(serve_websocket(state.clone(), config.websocket_port));
    }
    if config.tcp_port != 0 {
        listeners.spawn(serve_tcp(state.clone(), config.tcp_port));
    }
    #[cfg(unix)]
    if let Some(path) = config.local_socket.clone() {
        listeners.spawn(serve_local(state.clone(), path));
    }
    #[cfg(not(unix))]
    if config.local_socket.is_some() {
        warn!("Local sockets are only supported on Unix, ignoring local_socket");
    }

    if listeners.is_empty() {
        anyhow::bail!("every listener is disabled");
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
        Some(joined) = listeners.join_next() => {
            match joined {
                Ok(Ok(())) => warn!("Listener stopped unexpectedly"),
                Ok(Err(e)) => return Err(e),
                Err(e) => return Err(e.into()),
            }
        }
    }

    listeners.abort_all();
    #[cfg(unix)]
    if let Some(path) = &config.local_socket {
        let _ = std::fs::remove_file(path);
    }
    Ok(())
}

/// Run the handshake and the RPC session for one controller.
async fn handle_connection(state: AppState, conn: FramedConnection, transport: &'static str) {
    let span = info_span!("connection", id = %Uuid::new_v4(), transport);

    async move {
        info!("Controller connected");

        let channel = match SecureChannel::accept(conn, &state.password, &state.handshake).await {
            Ok(channel) => channel,
            Err(e) => {
                log_handshake_failure(&e);
                return;
            }
        };

        match state.server.serve(channel).await {
            Ok(()) => info!("Controller disconnected"),
            Err(e) => warn!("Session ended with error: {}", e),
        }
    }
    .instrument(span)
    .await
}

/// Wrong passwords are worth a warning; port scans, timeouts and dropped
/// connections are not.
fn log_handshake_failure(e: &TransportError) -> Level {
    if e.is_authentication_failure() {
        warn!("Rejected controller: wrong password");
        Level::WARN
    } else {
        info!("Handshake did not complete: {}", e);
        Level::INFO
    }
}

async fn serve_websocket(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/", get(ws_handler))
        .route("/health", get(health_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("WebSocket listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_connection(state, websocket::framed_socket(socket), "websocket"))
}

async fn serve_tcp(state: AppState, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("TCP listening on {}", addr);

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("TCP connection from {}", peer);
                let _ = stream.set_nodelay(true);
                tokio::spawn(handle_connection(state.clone(), framed_stream(stream), "tcp"));
            }
            Err(e) => error!("TCP accept failed: {}", e),
        }
    }
}

#[cfg(unix)]
async fn serve_local(state: AppState, path: PathBuf) -> anyhow::Result<()> {
    use tokio::net::UnixListener;

    // A stale socket file from a previous run would make bind fail.
    if path.exists() {
        std::fs::remove_file(&path)?;
    }
    let listener = UnixListener::bind(&path)?;
    info!("Local socket listening on {}", path.display());

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                tokio::spawn(handle_connection(state.clone(), framed_stream(stream), "local"));
            }
            Err(e) => error!("Local socket accept failed: {}", e),
        }
    }
}
