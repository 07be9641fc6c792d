//! netloop demo servers.
//!
//! Runs one echo server (TCP, HTTP or UDP) on an event loop group built
//! from a TOML configuration, until Ctrl-C.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use futures_util::StreamExt;

use netloop::config::{load_config, NetConfig};
use netloop::observability::{logging, metrics};
use netloop::stream::FrameStreamExt;
use netloop::udp::{DatagramSession, UdpOptions};
use netloop::{EventLoopGroup, HttpServer, TcpServer, TransportError, TransportSession};

#[derive(Debug, Parser)]
#[command(name = "netloop", version, about = "Echo servers on the netloop transport core")]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Which echo server to run.
    #[arg(short, long, value_enum, default_value_t = Mode::TcpEcho)]
    mode: Mode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    TcpEcho,
    HttpEcho,
    UdpEcho,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => NetConfig::default(),
    };

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), mode = ?cli.mode, "netloop starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let group = EventLoopGroup::from_config(&config.loops)?;
    tracing::info!(loops = group.size(), name = group.name(), "Event loop group started");

    let served = match cli.mode {
        Mode::TcpEcho => tcp_echo(&group, &config).await,
        Mode::HttpEcho => http_echo(&group, &config).await,
        Mode::UdpEcho => udp_echo(&group, &config).await,
    };
    if let Err(e) = served {
        tracing::error!(error = %e, "Failed to start server");
        group.shutdown().await;
        return Err(e.into());
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    group.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn tcp_echo(group: &EventLoopGroup, config: &NetConfig) -> netloop::Result<()> {
    let server = TcpServer::from_config(config)?
        .handle(group, |session: TransportSession| async move {
            let (mut inbound, outbound, _handle) = session.split();
            while let Some(frame) = inbound.next_frame().await? {
                outbound.send(frame).await?;
            }
            outbound.close().await
        })
        .await?;
    tracing::info!(address = %server.local_addr(), "TCP echo server listening");
    Ok(())
}

async fn http_echo(group: &EventLoopGroup, config: &NetConfig) -> netloop::Result<()> {
    HttpServer::from_config(config)?
        .get("/hello/{name}", |req, res| async move {
            let name = req.param("name").unwrap_or_default().to_string();
            Ok(res.send_string(format!("Hello {name}!")))
        })
        .handle(|mut req, res| async move {
            let body = req.receive().aggregate().await?;
            Ok(res.send_bytes(body))
        })
        .bind(group)
        .await?;
    Ok(())
}

async fn udp_echo(group: &EventLoopGroup, config: &NetConfig) -> netloop::Result<()> {
    let addr: SocketAddr = config
        .udp
        .bind_address
        .parse()
        .map_err(|e| TransportError::Config(format!("udp.bind_address: {e}")))?;
    let session = DatagramSession::bind(group, addr, &UdpOptions::from_config(config)).await?;
    tracing::info!(address = %session.local_addr(), "UDP echo server bound");

    let handle = group
        .loop_handle(session.loop_id())
        .ok_or(TransportError::ShuttingDown)?;
    let (mut datagrams, sender, _session) = session.split();
    handle
        .spawn(async move {
            while let Some(received) = datagrams.next().await {
                let datagram = match received {
                    Ok(datagram) => datagram,
                    Err(e) => {
                        tracing::warn!(error = %e, "Datagram receive failed");
                        continue;
                    }
                };
                let reply = datagram.reply(datagram.payload().clone());
                if let Err(e) = sender.send(reply).await {
                    tracing::warn!(recipient = %datagram.sender(), error = %e, "Echo reply failed");
                }
            }
        })?
        .detach();
    Ok(())
}
