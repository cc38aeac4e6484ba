//! Server configuration management.
//!
//! Configuration is stored as TOML. The file is looked up, in order, at the
//! first command-line argument, at `$FILESHARE_CONFIG`, and at the platform
//! default:
//! - Linux: `~/.config/fileshare/server.toml`
//! - Windows: `%APPDATA%/fileshare/server.toml`

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use fileshare_file_ops::expand_home;
use fileshare_server::{DEFAULT_SERVICE_NAME, ServerConfig};
use serde::{Deserialize, Serialize};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "FILESHARE_CONFIG";

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Identity sent in discovery replies (hostname by default).
    #[serde(default = "default_name")]
    pub name: String,

    /// Directory shared with peers. `~/` is expanded.
    #[serde(default = "default_shared_dir")]
    pub shared_dir: String,

    /// Address the TCP and UDP sockets bind to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// TCP port of the file protocol (0 = auto-assign).
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,

    /// Answer discovery probes.
    #[serde(default = "default_true")]
    pub discovery_enabled: bool,

    /// UDP port for discovery.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,

    /// Per-read session timeout in seconds (0 = disabled).
    #[serde(default)]
    pub read_timeout_secs: u64,
}

fn default_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| DEFAULT_SERVICE_NAME.into())
}

fn default_shared_dir() -> String {
    "shared_files".into()
}

fn default_bind_address() -> String {
    "0.0.0.0".into()
}

fn default_tcp_port() -> u16 {
    30001
}

fn default_true() -> bool {
    true
}

fn default_discovery_port() -> u16 {
    30000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: default_name(),
            shared_dir: default_shared_dir(),
            bind_address: default_bind_address(),
            tcp_port: default_tcp_port(),
            discovery_enabled: default_true(),
            discovery_port: default_discovery_port(),
            read_timeout_secs: 0,
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or creates a default there if the
    /// file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            tracing::info!(path = %path.display(), "created default configuration");
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Builds the immutable server configuration.
    pub fn to_server_config(&self) -> anyhow::Result<ServerConfig> {
        let bind_addr: IpAddr = self
            .bind_address
            .parse()
            .with_context(|| format!("invalid bind_address {:?}", self.bind_address))?;

        Ok(ServerConfig {
            shared_dir: expand_home(&self.shared_dir),
            bind_addr,
            tcp_port: self.tcp_port,
            discovery_port: self.discovery_enabled.then_some(self.discovery_port),
            service_name: self.name.clone(),
            read_timeout: (self.read_timeout_secs > 0)
                .then(|| Duration::from_secs(self.read_timeout_secs)),
        })
    }
}

/// Picks the config file path from the CLI argument, the environment, or
/// the platform default.
pub fn resolve_path(arg: Option<PathBuf>) -> PathBuf {
    choose_path(arg, std::env::var_os(CONFIG_ENV).map(PathBuf::from))
}

fn choose_path(arg: Option<PathBuf>, env: Option<PathBuf>) -> PathBuf {
    arg.or(env).unwrap_or_else(default_path)
}

/// Returns the platform-specific configuration file path.
fn default_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("fileshare").join("server.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        expand_home("~/.config/fileshare/server.toml")
    }
}
