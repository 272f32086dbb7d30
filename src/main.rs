//! Alias Ledger CLI Application
//!
//! Runs the alias server and offers local registration and lookup commands.

use alias_ledger::cli::{self, ServerConfig};
use alias_ledger::core::DEFAULT_THRESHOLD;
use alias_ledger::crypto::{PublicKeyFormat, SignatureAlgorithm, DEFAULT_KEY_BITS};
use alias_ledger::network::{Node, NodeConfig};
use alias_ledger::storage::StorageConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "alias-ledger")]
#[command(version)]
#[command(about = "Bind names to RSA public keys on a proof-of-work ledger", long_about = None)]
struct Cli {
    /// Data directory for ledger storage
    #[arg(
        short,
        long,
        env = "ALIAS_DATA_DIR",
        default_value_os_t = StorageConfig::default().data_dir
    )]
    data_dir: PathBuf,

    /// Peers to sync with (comma-separated host:port)
    #[arg(long, value_delimiter = ',')]
    peers: Vec<String>,

    /// Minimum proof of work (number of leading zero bits)
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: u32,

    /// Name recorded as the miner of new blocks
    #[arg(long, default_value = "alias-ledger")]
    miner: String,

    /// Seconds allowed for each peer connect or reply
    #[arg(long, default_value = "10")]
    timeout: u64,

    /// Flag copied into the metadata of each new record
    #[arg(long, env = "LIVE")]
    live: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the alias server
    Start {
        /// Port to listen on for HTTP
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Serve peers on this port
        #[arg(long)]
        peer_port: Option<u16>,
    },

    /// Register an alias for a key
    Register {
        /// Alias to claim
        #[arg(short, long)]
        alias: String,

        /// PEM private key file
        #[arg(short, long)]
        key: PathBuf,

        /// Public key format (PKIX or PKCS1_WITH_RSA)
        #[arg(long, default_value = "PKIX")]
        format: PublicKeyFormat,

        /// Signature algorithm (SHA512WITHRSA or SHA512WITHRSA_PSS)
        #[arg(long, default_value = "SHA512WITHRSA_PSS")]
        algorithm: SignatureAlgorithm,
    },

    /// Look up an alias
    Lookup {
        /// Alias to resolve
        alias: String,
    },

    /// List all registered aliases
    List,

    /// Generate an RSA key pair
    Keygen {
        /// Output file for the PEM private key
        #[arg(short, long)]
        output: PathBuf,

        /// Modulus size in bits
        #[arg(long, default_value_t = DEFAULT_KEY_BITS)]
        bits: usize,

        /// Format used to print the public key
        #[arg(long, default_value = "PKIX")]
        format: PublicKeyFormat,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let peer_port = match &cli.command {
        Commands::Start { peer_port, .. } => *peer_port,
        _ => None,
    };

    let config = NodeConfig {
        peer_port,
        peers: cli.peers.clone(),
        data_dir: cli.data_dir.clone(),
        miner: cli.miner.clone(),
        threshold: cli.threshold,
        timeout: Duration::from_secs(cli.timeout),
    };
    let open_node = || Node::open(config.clone()).map(Arc::new);

    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        match cli.command {
            // Key generation doesn't need a node
            Commands::Keygen {
                output,
                bits,
                format,
            } => {
                cli::cmd_keygen(&output, bits, format)?;
            }

            Commands::Start { port, host, .. } => {
                let node = open_node()?;
                cli::cmd_start(node, ServerConfig { host, port }, cli.live).await?;
            }

            Commands::Register {
                alias,
                key,
                format,
                algorithm,
            } => {
                let node = open_node()?;
                cli::cmd_register(node, cli.live, &alias, &key, format, algorithm).await?;
            }

            Commands::Lookup { alias } => {
                let node = open_node()?;
                cli::cmd_lookup(&node, &alias).await?;
            }

            Commands::List => {
                let node = open_node()?;
                cli::cmd_list(&node).await?;
            }
        }

        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
