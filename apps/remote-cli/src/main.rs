//! Streaming Remote CLI
//!
//! Connects to a server, runs one command and exits. `watch` stays
//! connected and prints events until interrupted.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use crypto_session::KdfParams;
use net_transport::{
    FramedConnection, HandshakeOptions, TransportError, connect_tcp, connect_websocket,
};
use remote_rpc::{ClientOptions, RpcClient};
use secrecy::SecretString;
use shared_protocol::{Output, Scene};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "remote-cli", about = "Control streaming software remotely")]
struct Args {
    /// WebSocket URL of the server
    #[arg(long, default_value = "ws://127.0.0.1:9002")]
    url: String,

    /// Connect over TCP to HOST:PORT instead of WebSocket
    #[arg(long, conflicts_with = "socket")]
    tcp: Option<String>,

    /// Connect to a local Unix socket instead of WebSocket
    #[arg(long)]
    socket: Option<PathBuf>,

    #[arg(long, env = "STREAMING_REMOTE_PASSWORD", hide_env_values = true)]
    password: String,

    /// Argon2id memory cost in KiB; must match the server
    #[arg(long, default_value_t = KdfParams::interactive().memory_kib)]
    kdf_memory_kib: u32,

    /// Argon2id passes; must match the server
    #[arg(long, default_value_t = KdfParams::interactive().passes)]
    kdf_passes: u32,

    /// Argon2id lanes; must match the server
    #[arg(long, default_value_t = KdfParams::interactive().lanes)]
    kdf_lanes: u32,

    /// Handshake timeout in seconds
    #[arg(long, default_value_t = 10)]
    handshake_timeout: u64,

    /// Per-call timeout in seconds (0 waits forever)
    #[arg(long, default_value_t = 30)]
    call_timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List outputs
    Outputs,
    /// List scenes
    Scenes,
    /// Start an output
    Start { id: String },
    /// Stop an output
    Stop { id: String },
    /// Set an output's delay
    SetDelay { id: String, seconds: i64 },
    /// Switch to a scene
    Activate { id: String },
    /// Print events until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            let auth = e
                .downcast_ref::<TransportError>()
                .is_some_and(TransportError::is_authentication_failure);
            if auth {
                eprintln!("(is the password correct?)");
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn open(args: &Args) -> anyhow::Result<FramedConnection> {
    if let Some(addr) = &args.tcp {
        debug!("Connecting over TCP to {}", addr);
        return connect_tcp(addr.as_str())
            .await
            .with_context(|| format!("connecting to {addr}"));
    }

    if let Some(path) = &args.socket {
        #[cfg(unix)]
        {
            debug!("Connecting to local socket {}", path.display());
            return net_transport::connect_unix(path)
                .await
                .with_context(|| format!("connecting to {}", path.display()));
        }
        #[cfg(not(unix))]
        anyhow::bail!("local sockets are not supported here: {}", path.display());
    }

    debug!("Connecting over WebSocket to {}", args.url);
    connect_websocket(&args.url)
        .await
        .with_context(|| format!("connecting to {}", args.url))
}

async fn run(args: Args) -> anyhow::Result<()> {
    let conn = open(&args).await?;

    let handshake = HandshakeOptions {
        kdf: KdfParams {
            memory_kib: args.kdf_memory_kib,
            passes: args.kdf_passes,
            lanes: args.kdf_lanes,
        },
        timeout: Some(Duration::from_secs(args.handshake_timeout)),
    };
    let options = ClientOptions {
        call_timeout: (args.call_timeout > 0).then(|| Duration::from_secs(args.call_timeout)),
    };
    let password = SecretString::from(args.password);

    // Handshake errors stay a TransportError so main can classify them.
    let client = RpcClient::connect(conn, &password, &handshake, options).await?;
    client.ready().await?;

    match args.command {
        Command::Outputs => {
            let mut outputs: Vec<Output> = client.get_outputs().await?.into_values().collect();
            outputs.sort_by(|a, b| a.id.cmp(&b.id));
            for output in outputs {
                print_output(&output);
            }
        }
        Command::Scenes => {
            let mut scenes: Vec<Scene> = client.get_scenes().await?.into_values().collect();
            scenes.sort_by(|a, b| a.id.cmp(&b.id));
            for scene in scenes {
                let marker = if scene.active { "*" } else { " " };
                println!("{marker} {:<16} {}", scene.id, scene.name);
            }
        }
        Command::Start { id } => client.start_output(&id).await?,
        Command::Stop { id } => client.stop_output(&id).await?,
        Command::SetDelay { id, seconds } => client.set_delay(&id, seconds).await?,
        Command::Activate { id } => client.activate_scene(&id).await?,
        Command::Watch => {
            let _outputs = client.on_output_state_changed(|id, state| {
                println!("output {id} is now {state}");
            });
            let _scenes = client.on_current_scene_changed(|id| {
                println!("scene {id} is now active");
            });

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                reason = client.closed() => {
                    anyhow::bail!("session ended: {reason}");
                }
            }
        }
    }

    client.close().await;
    Ok(())
}

fn print_output(output: &Output) {
    let delay = output
        .delay_seconds
        .map(|s| format!("{s}s delay"))
        .unwrap_or_default();
    println!(
        "{:<16} {:<24} {:<16} {:<10} {}",
        output.id, output.name, output.output_type, output.state, delay
    );
}
