use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Base URL of the remote blob backend the relay talks to.
    pub relay_url: String,
    /// Bearer token presented to the blob backend.
    pub relay_token: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Personal cloud-storage backend")]
pub struct Args {
    /// Host to bind to (overrides CLOUD_DRIVE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides CLOUD_DRIVE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides CLOUD_DRIVE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Blob backend base URL (overrides CLOUD_DRIVE_RELAY_URL)
    #[arg(long)]
    pub relay_url: Option<String>,

    /// Blob backend token (overrides CLOUD_DRIVE_RELAY_TOKEN)
    #[arg(long)]
    pub relay_token: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("CLOUD_DRIVE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("CLOUD_DRIVE_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing CLOUD_DRIVE_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading CLOUD_DRIVE_PORT"),
        };
        let env_db = env::var("CLOUD_DRIVE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/cloud_drive.db".into());
        let env_relay =
            env::var("CLOUD_DRIVE_RELAY_URL").unwrap_or_else(|_| "http://127.0.0.1:9100".into());
        let env_token = env::var("CLOUD_DRIVE_RELAY_TOKEN").unwrap_or_default();

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            relay_url: args.relay_url.unwrap_or(env_relay),
            relay_token: args.relay_token.unwrap_or(env_token),
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
