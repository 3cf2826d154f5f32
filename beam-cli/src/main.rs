use anyhow::{Context, Result, bail};
use beam_peer::transport::TransportConfig;
use beam_peer::{
    DirectoryStore, FileHandle, PeerConfig, PeerId, PeerRecord, Session, SessionEvent,
    SessionHandle, WebRtcFactory, WsRelay,
};
use clap::{Args, Parser, Subcommand};
use colored::*;
use dialoguer::Confirm;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "beam", about = "Send files directly to peers you can see online")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PeerArgs {
    /// WebSocket URL of the presence relay.
    #[arg(long, env = "BEAM_RELAY", default_value = "ws://127.0.0.1:8080/ws")]
    relay: String,

    /// Identity announced to presence. A random one is used when absent.
    #[arg(long, env = "BEAM_IDENTITY")]
    identity: Option<String>,

    #[arg(long, env = "BEAM_NAME", default_value = "beam")]
    name: String,

    /// TOML file with peer tunables.
    #[arg(long, env = "BEAM_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a presence relay.
    Relay {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: SocketAddr,
    },
    /// List peers currently online.
    Peers {
        #[command(flatten)]
        peer: PeerArgs,

        /// How long to listen for presence before printing.
        #[arg(long, default_value_t = 2)]
        wait_secs: u64,
    },
    /// Offer a file to a peer and send it once accepted.
    Send {
        #[command(flatten)]
        peer: PeerArgs,

        #[arg(long)]
        to: String,

        path: PathBuf,
    },
    /// Wait for offers and save accepted files.
    Receive {
        #[command(flatten)]
        peer: PeerArgs,

        #[arg(long, default_value = ".")]
        dir: PathBuf,

        /// Accept every offer without asking.
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Commands::Relay { bind } => {
            println!("{} {}", "📡 Relay listening on".green().bold(), bind);
            beam_relay::serve(bind).await
        }
        Commands::Peers { peer, wait_secs } => list_peers(peer, wait_secs).await,
        Commands::Send { peer, to, path } => send(peer, PeerId::from(to), path).await,
        Commands::Receive { peer, dir, yes } => receive(peer, dir, yes).await,
    }
}

async fn start_session(
    args: &PeerArgs,
    store_root: PathBuf,
) -> Result<(SessionHandle, mpsc::UnboundedReceiver<SessionEvent>, PeerRecord)> {
    let config = match &args.config {
        Some(path) => PeerConfig::load(path)?,
        None => PeerConfig::default(),
    };
    let identity = args
        .identity
        .clone()
        .map(PeerId::from)
        .unwrap_or_else(PeerId::random);
    let local = PeerRecord::new(identity, args.name.clone());

    let (relay, relay_rx) = WsRelay::connect(&args.relay)
        .await
        .with_context(|| format!("Failed to connect to relay at {}", args.relay))?;
    let factory = WebRtcFactory::new(TransportConfig::from(&config));

    let (session, handle, events) = Session::new(
        local.clone(),
        config,
        Arc::new(relay),
        relay_rx,
        Arc::new(factory),
        Arc::new(DirectoryStore::new(store_root)),
    );
    tokio::spawn(session.run());

    println!(
        "{} {} ({})",
        "🔗 Online as".cyan(),
        local.identity.to_string().bold(),
        local.display_name
    );
    Ok((handle, events, local))
}

async fn list_peers(args: PeerArgs, wait_secs: u64) -> Result<()> {
    let (handle, mut events, _) = start_session(&args, std::env::temp_dir()).await?;

    let deadline = tokio::time::sleep(Duration::from_secs(wait_secs));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.recv() => match event {
                Some(event) => debug!("{:?}", event),
                None => bail!("Session ended unexpectedly"),
            },
        }
    }

    let peers = handle.peers().await?;
    if peers.is_empty() {
        println!("{}", "Nobody else is online.".yellow());
    }
    for peer in peers {
        println!("  • {} ({})", peer.identity.to_string().bold(), peer.display_name);
    }

    handle.shutdown().await?;
    Ok(())
}

async fn send(args: PeerArgs, to: PeerId, path: PathBuf) -> Result<()> {
    let file = FileHandle::from_path(&path)
        .await
        .with_context(|| format!("Cannot read {}", path.display()))?;
    let store_root = path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let (handle, mut events, _) = start_session(&args, store_root).await?;

    println!("{} {} ...", "⏳ Waiting for".cyan(), to.to_string().bold());
    let mut offered = handle.peers().await?.iter().any(|p| p.identity == to);
    if offered {
        handle.initiate(to.clone(), file.clone()).await?;
    }

    let result = loop {
        let Some(event) = events.recv().await else {
            break Err(anyhow::anyhow!("Session ended unexpectedly"));
        };
        match event {
            SessionEvent::PeerJoined(record) if record.identity == to && !offered => {
                handle.initiate(to.clone(), file.clone()).await?;
                offered = true;
                println!("{} {}", "📨 Offer sent to".cyan(), record.display_name);
            }
            SessionEvent::TransferStarted { file_name, size, .. } => {
                println!("{} {} ({} bytes)", "🚀 Sending".green(), file_name, size);
            }
            SessionEvent::Progress {
                transferred, total, ..
            } => {
                println!("   {}/{} bytes", transferred, total);
            }
            SessionEvent::FileSent { file_name, size, .. } => {
                println!(
                    "{} {} ({} bytes)",
                    "✨ Sent".green().bold(),
                    file_name,
                    size
                );
                break Ok(());
            }
            SessionEvent::OfferDeclined {
                peer, display_name, ..
            } => {
                break Err(anyhow::anyhow!("{} ({}) declined the file", display_name, peer));
            }
            SessionEvent::OfferExpired { peer, .. } => {
                break Err(anyhow::anyhow!("{} did not answer in time", peer));
            }
            SessionEvent::TransferFailed { peer, reason } => {
                break Err(anyhow::anyhow!("Transfer to {} failed: {}", peer, reason));
            }
            other => debug!("{:?}", other),
        }
    };

    handle.shutdown().await?;
    result
}

async fn receive(args: PeerArgs, dir: PathBuf, yes: bool) -> Result<()> {
    let (handle, mut events, _) = start_session(&args, dir.clone()).await?;
    println!(
        "{} {}",
        "📥 Saving accepted files to".cyan(),
        dir.display()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => {
                let Some(event) = event else {
                    bail!("Session ended unexpectedly");
                };
                handle_incoming(&handle, event, yes).await?;
            }
        }
    }

    handle.shutdown().await?;
    Ok(())
}

async fn handle_incoming(handle: &SessionHandle, event: SessionEvent, yes: bool) -> Result<()> {
    match event {
        SessionEvent::PeerJoined(record) => {
            println!("{} {}", "👋".normal(), record.display_name);
        }
        SessionEvent::IncomingOffer { from, offer } => {
            let prompt = format!(
                "{} wants to send {} ({} bytes). Accept?",
                offer.from_user.display_name, offer.file_name, offer.file_size
            );
            let accept = yes || ask(prompt).await?;
            let answer = if accept {
                handle.accept(from).await.map(|_| ())
            } else {
                handle.decline(from).await
            };
            // the offer may have expired while the prompt was open
            if let Err(e) = answer {
                println!("{} {}", "⚠️".yellow(), e);
            }
        }
        SessionEvent::IncomingOfferWithdrawn { offer, .. } => {
            println!("{} {}", "Offer withdrawn:".yellow(), offer.file_name);
        }
        SessionEvent::FileReceived { header, location, .. } => {
            println!(
                "{} {} -> {}",
                "✨ Received".green().bold(),
                header.name,
                location
            );
        }
        SessionEvent::TransferFailed { peer, reason } => {
            println!("{} {}: {}", "❌ Transfer failed from".red(), peer, reason);
        }
        other => debug!("{:?}", other),
    }
    Ok(())
}

async fn ask(prompt: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || Confirm::new().with_prompt(prompt).interact())
        .await?
        .context("Failed to read answer")
}
