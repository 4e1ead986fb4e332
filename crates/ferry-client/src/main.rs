/// Sending endpoint CLI.
///
/// Sends one file toward the server, addressing every datagram at the
/// local relay that sits between the endpoints. The server is named so
/// the operator sees where the file is supposed to land; the relay is
/// what actually receives the traffic.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use ferry_protocol::segment::Origin;
use ferry_protocol::sender::{run_sender, SendConfig};
use ferry_protocol::TracingLogger;

#[derive(Parser)]
#[command(author, version, about = "Send one file over the relay")]
struct Cli {
    /// Server hostname or IPv4 address (resolved and logged; datagrams
    /// still go to the relay).
    server: String,

    /// Port the server listens on.
    server_port: u16,

    /// Localhost port of the relay every segment is sent to.
    relay_port: u16,

    /// File to transfer.
    file: PathBuf,

    /// Local port to bind; also stamped into every segment header.
    #[arg(long, default_value_t = 5555)]
    local_port: u16,

    /// IPv4 address stamped into every segment header as the origin, in
    /// dotted-decimal form.
    #[arg(long, default_value = "127.0.0.1")]
    origin_ip: String,

    /// How long to wait for an ACK before retransmitting, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    ack_timeout_ms: u64,

    /// Delay after each send, in milliseconds; throttles against local
    /// buffer overrun.
    #[arg(long, default_value_t = 10)]
    pacing_ms: u64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ferry_client=info,ferry_protocol=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let server = format!("{}:{}", cli.server, cli.server_port);
    let server_addr = server
        .to_socket_addrs()
        .with_context(|| format!("cannot resolve {server}"))?
        .next()
        .with_context(|| format!("{server} resolved to no addresses"))?;

    let origin = Origin::parse(&cli.origin_ip, u32::from(cli.local_port))
        .context("invalid origin address")?;
    let relay = SocketAddr::from(([127, 0, 0, 1], cli.relay_port));
    let bind = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), cli.local_port);
    info!(%server_addr, %relay, %bind, "sending {}", cli.file.display());

    let config = SendConfig {
        origin,
        relay,
        bind,
        file_path: cli.file,
        ack_timeout: Duration::from_millis(cli.ack_timeout_ms),
        pacing: Duration::from_millis(cli.pacing_ms),
    };

    let summary = run_sender(config, Arc::new(TracingLogger)).context("transfer failed")?;
    info!(
        "sent {} ({} bytes) in {:.2}s with {} data segments and {} retransmissions",
        summary.file_name,
        summary.file_size,
        summary.elapsed.as_secs_f64(),
        summary.data_segments,
        summary.retransmits
    );
    Ok(())
}
