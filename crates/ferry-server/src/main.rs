/// Receiving endpoint CLI.
///
/// Accepts one file and writes it into the output directory, ACKing
/// through the local relay. The process serves a single transfer and
/// exits; run it again for the next file.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use ferry_protocol::receiver::{run_receiver, RecvConfig};
use ferry_protocol::TracingLogger;

// Upper bound on one blocking wait; the sender's retransmissions drive
// the transfer, the receiver only needs to wake up now and then.
const IDLE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(author, version, about = "Receive one file over the relay")]
struct Cli {
    /// Port to listen on.
    server_port: u16,

    /// Localhost port of the relay every ACK is sent to.
    relay_port: u16,

    /// Directory the received file is written into.
    #[arg(long, default_value = "recv")]
    output_dir: PathBuf,

    /// How long to keep re-ACKing duplicates of the final segment after
    /// the transfer completes, in milliseconds.
    #[arg(long, default_value_t = 2000)]
    linger_ms: u64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ferry_server=info,ferry_protocol=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let bind = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), cli.server_port);
    let relay = SocketAddr::from(([127, 0, 0, 1], cli.relay_port));
    info!(%bind, %relay, "waiting for a transfer");

    let config = RecvConfig {
        bind,
        relay,
        output_dir: cli.output_dir,
        idle_timeout: IDLE_TIMEOUT,
        linger: Duration::from_millis(cli.linger_ms),
    };

    let summary = run_receiver(config, Arc::new(TracingLogger)).context("transfer failed")?;
    info!(
        "received {} ({} bytes) in {:.2}s with {} data segments and {} duplicates re-ACKed",
        summary.file_name,
        summary.bytes_written,
        summary.elapsed.as_secs_f64(),
        summary.data_segments,
        summary.duplicates_acked
    );
    Ok(())
}
