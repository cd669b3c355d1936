use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "postfeed", about = "A social feed server with live post notifications")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub feed: FeedConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub path: Option<PathBuf>,
    /// URL prefix under which stored images are served and referenced.
    pub public_prefix: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub session_hours: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct FeedConfig {
    pub per_page: u32,
    pub broadcast_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            public_prefix: "images".to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { session_hours: 720 }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            per_page: 2,
            broadcast_capacity: 256,
        }
    }
}

impl Config {
    /// File values first, then CLI flags, then paths derived from the data dir.
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let file = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = Self::read(&file)?;
        config.apply_cli(cli);
        config.fill_paths(&data_dir);
        config.check()?;
        Ok(config)
    }

    fn read(file: &Path) -> anyhow::Result<Self> {
        if !file.exists() {
            return Ok(Config::default());
        }
        let raw = std::fs::read_to_string(file)
            .with_context(|| format!("reading {}", file.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing {}", file.display()))
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host {
            self.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
    }

    fn fill_paths(&mut self, data_dir: &Path) {
        self.database
            .path
            .get_or_insert_with(|| data_dir.join("postfeed.db"));
        self.storage
            .path
            .get_or_insert_with(|| data_dir.join("images"));
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.feed.per_page == 0 {
            anyhow::bail!("feed.per_page must be at least 1");
        }
        if self.feed.broadcast_capacity == 0 {
            anyhow::bail!("feed.broadcast_capacity must be at least 1");
        }
        let prefix = self.storage.public_prefix.trim_matches('/');
        if prefix.is_empty() || prefix.contains('/') {
            anyhow::bail!("storage.public_prefix must be a single path segment");
        }
        Ok(())
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        match &cli.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".postfeed"),
        }
    }

    /// Database location. Falls back to a relative file when `load` was bypassed.
    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("postfeed.db"))
    }

    pub fn images_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("images"))
    }
}
