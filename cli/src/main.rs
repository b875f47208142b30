//! kvevents CLI: operator tooling around the KV-cache event pipeline.
//!
//! # Commands
//! ```text
//! kvevents run     --config <fleet.yaml>
//! kvevents decode  --file <payload.bin> | --hex <hex>
//! kvevents publish --bind tcp://0.0.0.0:5557 --count 100 --interval-ms 50
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod app_config;
mod cmd_decode;
mod cmd_publish;
mod cmd_run;

#[derive(Parser)]
#[command(
    name = "kvevents",
    about = "KV-cache event ingestion: run a fleet, decode payloads, publish test events",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Subscribe to every configured endpoint until Ctrl-C
    Run {
        /// YAML or JSON file with `log` and `fleet` sections
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Decode one msgpack event batch and print it as JSON
    Decode {
        /// File holding the raw payload bytes
        #[arg(long, conflicts_with = "hex", required_unless_present = "hex")]
        file: Option<PathBuf>,
        /// Payload as hex (optionally 0x-prefixed)
        #[arg(long)]
        hex: Option<String>,
        /// Single-line JSON instead of pretty-printed
        #[arg(long)]
        compact: bool,
    },

    /// Publish synthetic event batches on a PUB socket
    Publish {
        /// Address to bind, e.g. tcp://0.0.0.0:5557
        #[arg(long, default_value = "tcp://127.0.0.1:5557")]
        bind: String,
        /// Number of batches to send
        #[arg(long, default_value_t = 10)]
        count: u64,
        /// Pause between batches
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,
        /// Topic frame of every message
        #[arg(long, default_value = "kv-events")]
        topic: String,
        /// First sequence number
        #[arg(long, default_value_t = 0)]
        start_seq: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => cmd_run::run(&config).await,

        Commands::Decode { file, hex, compact } => {
            cmd_decode::run(file.as_deref(), hex.as_deref(), compact)
        }

        Commands::Publish { bind, count, interval_ms, topic, start_seq } => {
            cmd_publish::run(&bind, count, interval_ms, &topic, start_seq).await
        }
    }
}
