use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use ocfl_jobs::{JobManagerConfig, LogHubConfig};
use ocfl_query::{QueryConfig, DEFAULT_CHUNK_SIZE};

use crate::error::{ServerError, ServerResult};

pub const ENV_STORE_DIR: &str = "OCFL_INDEX_STOREDIR";
pub const ENV_INDEX_FILE: &str = "OCFL_INDEX_FILE";
pub const ENV_LISTEN: &str = "OCFL_INDEX_LISTEN";
pub const ENV_CONCURRENCY: &str = "OCFL_INDEX_CONCURRENCY";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Directory holding the OCFL storage root.
    pub storage_root: PathBuf,
    /// Index log file. `None` keeps the index in memory only.
    pub index_file: Option<PathBuf>,
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Inventories parsed at once; 0 means one per CPU.
    pub parse_concurrency: usize,
    /// Largest chunk sent when streaming content.
    pub chunk_size: usize,
    /// Log entries replayed to new followers.
    pub log_backlog: usize,
    pub max_followers: usize,
    /// Record file sizes by reading content file metadata.
    pub read_sizes: bool,
    /// Start a full index run when the server starts.
    pub index_on_start: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            storage_root: PathBuf::from("."),
            index_file: Some(PathBuf::from("ocfl-index.log")),
            default_page_size: 1000,
            max_page_size: 1000,
            parse_concurrency: 0,
            chunk_size: DEFAULT_CHUNK_SIZE,
            log_backlog: 64,
            max_followers: 64,
            read_sizes: false,
            index_on_start: false,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(s: &str) -> ServerResult<Self> {
        toml::from_str(s).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Load from a TOML file; missing keys take their defaults.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Apply `OCFL_INDEX_*` environment variables.
    pub fn apply_env(&mut self) -> ServerResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup, using the environment variable
    /// names as keys. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ServerResult<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(dir) = get(ENV_STORE_DIR) {
            self.storage_root = PathBuf::from(dir);
        }
        if let Some(file) = get(ENV_INDEX_FILE) {
            self.index_file = Some(PathBuf::from(file));
        }
        if let Some(addr) = get(ENV_LISTEN) {
            self.bind_addr = parse_listen(&addr)?;
        }
        if let Some(conc) = get(ENV_CONCURRENCY) {
            self.parse_concurrency = conc
                .trim()
                .parse()
                .map_err(|e| ServerError::Config(format!("{ENV_CONCURRENCY}={conc:?}: {e}")))?;
        }
        Ok(())
    }

    pub fn query_config(&self) -> QueryConfig {
        QueryConfig {
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
        }
    }

    pub fn job_config(&self) -> JobManagerConfig {
        let defaults = JobManagerConfig::default();
        JobManagerConfig {
            parse_concurrency: match self.parse_concurrency {
                0 => defaults.parse_concurrency,
                n => n,
            },
            hub: LogHubConfig {
                backlog: self.log_backlog,
                max_followers: self.max_followers,
                ..defaults.hub
            },
        }
    }
}

/// Parse a listen address. A bare `:port` binds every interface.
pub fn parse_listen(addr: &str) -> ServerResult<SocketAddr> {
    let addr = addr.trim();
    let full = match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => addr.to_string(),
    };
    full.parse()
        .map_err(|e| ServerError::Config(format!("invalid listen address {addr:?}: {e}")))
}
