//! Sp3ctra CLI - command-line host for the synthesis engine.
//!
//! A thin shell around [`sp3ctra_io::Engine`]: parse arguments, initialize
//! tracing, load and validate the configuration, run until the user quits.

use clap::Parser;
use sp3ctra_config::Config;
use sp3ctra_io::Engine;
use std::io::BufRead;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "sp3ctra")]
#[command(author, version, about = "Scanner-driven real-time synthesis engine", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// List audio output devices and exit.
    #[arg(long)]
    list_devices: bool,

    /// Override the output device (name substring).
    #[arg(long)]
    device: Option<String>,

    /// Override the UDP listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the UDP listen/multicast address.
    #[arg(long)]
    address: Option<String>,

    /// Print ingest/underrun statistics every N seconds (0 disables).
    #[arg(long, default_value_t = 5)]
    stats_interval: u64,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(device) = cli.device {
        config.audio.device = Some(device);
    }
    if let Some(port) = cli.port {
        config.network.udp_port = port;
    }
    if let Some(address) = cli.address {
        config.network.udp_address = address;
    }

    init_tracing(config.log_level.as_deref());

    if cli.list_devices {
        for name in sp3ctra_io::list_output_devices()? {
            println!("{name}");
        }
        return Ok(());
    }

    config.validate()?;
    let engine = Engine::new(&config)?;

    println!(
        "sp3ctra listening on {}:{} - press Enter or type 'q' to quit",
        config.network.udp_address, config.network.udp_port
    );

    if cli.stats_interval > 0 {
        run_with_stats(&engine, Duration::from_secs(cli.stats_interval));
    } else {
        wait_for_quit();
    }

    drop(engine); // joins every thread
    tracing::info!("bye");
    Ok(())
}

fn init_tracing(config_level: Option<&str>) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config_level.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Block until the user presses Enter (or stdin closes).
fn wait_for_quit() {
    let stdin = std::io::stdin();
    let mut line = String::new();
    let _ = stdin.lock().read_line(&mut line);
}

/// Print periodic statistics until the user quits.
fn run_with_stats(engine: &Engine, interval: Duration) {
    let (quit_tx, quit_rx) = std::sync::mpsc::channel::<()>();
    std::thread::spawn(move || {
        wait_for_quit();
        let _ = quit_tx.send(());
    });

    loop {
        match quit_rx.recv_timeout(interval) {
            Ok(()) | Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                let stats = engine.ingest_stats().snapshot();
                tracing::info!(
                    lines = stats.complete_lines,
                    incomplete = stats.incomplete_lines,
                    dropped = stats.dropped_fragments,
                    malformed = stats.malformed_packets,
                    underruns = engine.underruns(),
                    master_volume = engine.master_volume(),
                    "stats"
                );
            }
        }
    }
}
