use cmkeeper::{ConfigError, SupervisorConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "cmkeeper";

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
	pub supervisor: SupervisorConfig,
	#[serde(default = "default_true")]
	pub autostart: bool,
	#[serde(default)]
	pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
	#[serde(default = "default_true")]
	pub enabled: bool,
	#[serde(default = "default_bind")]
	pub bind: String,
	#[serde(default = "default_port")]
	pub port: u16,
}

impl Default for HttpConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			bind: default_bind(),
			port: default_port(),
		}
	}
}

fn default_true() -> bool {
	true
}
fn default_bind() -> String {
	"127.0.0.1".to_string()
}
fn default_port() -> u16 {
	13370
}

impl DaemonConfig {
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		Self::parse(path, &content)
	}

	fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})?;
		config.supervisor.validate()?;
		Ok(config)
	}
}

/// `--config <file>`, then `$CMKEEPER_CONFIG`, then the XDG config dir.
pub fn config_path(args: &[String]) -> PathBuf {
	if let Some(pos) = args.iter().position(|a| a == "--config" || a == "-c") {
		if let Some(path) = args.get(pos + 1) {
			return PathBuf::from(path);
		}
	}
	if let Ok(path) = std::env::var("CMKEEPER_CONFIG") {
		return PathBuf::from(path);
	}
	config_dir().join("config.toml")
}

fn config_dir() -> PathBuf {
	if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
		PathBuf::from(dir).join(APP_NAME)
	} else if let Ok(home) = std::env::var("HOME") {
		PathBuf::from(home).join(".config").join(APP_NAME)
	} else {
		PathBuf::from("/etc").join(APP_NAME)
	}
}
