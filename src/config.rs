//! Agent and server configuration
//!
//! Both binaries are configured through clap with environment fallbacks,
//! so every flag can also be set via the matching env var (flags win).
//! `.env` files are honored because the binaries call `dotenv` before
//! parsing.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use ipnet::IpNet;

/// Transport the agent uses to reach the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    Http,
    Rpc,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "metrion-agent", version)]
pub struct AgentConfig {
    /// Server address (host:port)
    #[arg(short = 'a', long, env = "ADDRESS", default_value = "localhost:8080")]
    pub address: String,

    /// Sampling interval in seconds
    #[arg(short = 'p', long, env = "POLL_INTERVAL", default_value_t = 2)]
    pub poll_interval: u64,

    /// Report interval in seconds
    #[arg(short = 'r', long, env = "REPORT_INTERVAL", default_value_t = 10)]
    pub report_interval: u64,

    /// Outbound concurrency: job queue capacity, workers = limit - 1
    #[arg(short = 'l', long, env = "RATE_LIMIT", default_value_t = 3)]
    pub rate_limit: usize,

    /// Shared secret for signing payloads; signing disabled when absent
    #[arg(short = 'k', long, env = "KEY")]
    pub key: Option<String>,

    /// Path to the server's RSA public key (PEM); encryption disabled when absent
    #[arg(long = "crypto-key", env = "CRYPTO_KEY")]
    pub crypto_key: Option<PathBuf>,

    /// Wire transport to use
    #[arg(short = 't', long, env = "TRANSPORT", value_enum, default_value = "http")]
    pub transport: TransportKind,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "metrion-server", version)]
pub struct ServerConfig {
    /// Listen address (host:port)
    #[arg(short = 'a', long, env = "ADDRESS", default_value = "localhost:8080")]
    pub address: String,

    /// Additional RPC listen address; RPC disabled when absent
    #[arg(long = "rpc-address", env = "RPC_ADDRESS")]
    pub rpc_address: Option<String>,

    /// Postgres DSN; in-memory storage is used when absent
    #[arg(short = 'd', long, env = "DATABASE_DSN")]
    pub database_dsn: Option<String>,

    /// Backup interval in seconds
    #[arg(short = 'i', long, env = "STORE_INTERVAL", default_value_t = 300)]
    pub store_interval: u64,

    /// Backup file path
    #[arg(
        short = 'f',
        long,
        env = "FILE_STORAGE_PATH",
        default_value = "./metrion-backup.json"
    )]
    pub file_storage_path: PathBuf,

    /// Restore the store from the backup file at startup
    #[arg(
        long,
        env = "RESTORE",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub restore: bool,

    /// Shared secret for verifying signed payloads
    #[arg(short = 'k', long, env = "KEY")]
    pub key: Option<String>,

    /// Path to the RSA private key (PEM) for payload decryption
    #[arg(long = "crypto-key", env = "CRYPTO_KEY")]
    pub crypto_key: Option<PathBuf>,

    /// CIDR of trusted sources; requests outside it are rejected
    #[arg(short = 's', long, env = "TRUSTED_SUBNET")]
    pub trusted_subnet: Option<IpNet>,
}

impl ServerConfig {
    /// Whether startup should read the backup file.
    ///
    /// A configured database is the durable store, so the file restore
    /// only applies to the in-memory backend.
    pub fn wants_file_restore(&self) -> bool {
        self.restore && self.database_dsn.is_none()
    }
}
