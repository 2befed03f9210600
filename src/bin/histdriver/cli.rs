use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Watch-history driver: polls a history provider and ships new records to a store.
#[derive(Parser, Debug)]
#[command(name = "histdriver", version, about = "Watch-history ingestion driver")]
pub struct Cli {
    /// Optional TOML config file (overrides HD_* environment, overridden by flags)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Cmd,
}

/// Ingestion settings shared by `serve` and `poll`.
#[derive(Args, Debug, Default)]
pub struct LoopArgs {
    /// Store endpoint: tcp://host:port, file://path or - for stdout
    #[arg(long)]
    pub store: Option<String>,
    /// Seconds between cycles
    #[arg(long)]
    pub interval_secs: Option<u64>,
    /// Newest history items requested per fetch
    #[arg(long)]
    pub max_items: Option<usize>,
    /// Downloader executable
    #[arg(long)]
    pub fetch_program: Option<String>,
    /// Failed publishes: retry | best-effort
    #[arg(long)]
    pub delivery: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Register the datasource and run the control surface
    Serve {
        /// Listen address (host:port)
        #[arg(long)]
        listen: Option<String>,
        /// Serve plain HTTP (local testing only)
        #[arg(long)]
        plaintext: bool,
        /// PEM certificate chain
        #[arg(long)]
        tls_cert: Option<PathBuf>,
        /// PEM private key (defaults to --tls-cert when only that is given)
        #[arg(long)]
        tls_key: Option<PathBuf>,
        /// Directory served under /ui
        #[arg(long)]
        static_dir: Option<PathBuf>,
        #[command(flatten)]
        loop_args: LoopArgs,
    },
    /// Run one ingestion loop in the foreground
    Poll {
        /// Account username
        #[arg(long)]
        email: String,
        /// Environment variable holding the password
        #[arg(long, default_value = "HD_PASSWORD")]
        password_env: String,
        /// Stop after N cycles (runs until the loop fails when omitted)
        #[arg(long)]
        cycles: Option<u64>,
        #[command(flatten)]
        loop_args: LoopArgs,
    },
    /// Print records of CURRENT that are new relative to PREVIOUS (provider JSON dumps)
    Diff {
        #[arg(long)]
        previous: Option<PathBuf>,
        #[arg(long)]
        current: PathBuf,
        /// One JSON record per line instead of a table
        #[arg(long)]
        json: bool,
    },
}
