use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Immutable supervisor settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SupervisorConfig {
	/// Connection manager binary. Invoked directly, never through a shell.
	pub path: PathBuf,
	#[serde(default = "default_respawn_delay")]
	pub respawn_delay_ms: u64,
	/// APN parameters, appended verbatim to the command line.
	#[serde(default)]
	pub apn: Vec<String>,
	#[serde(default = "default_max_log_lines")]
	pub max_log_lines: usize,
	#[serde(default = "default_poll_interval")]
	pub poll_interval_ms: u64,
	#[serde(default = "default_read_timeout")]
	pub read_timeout_ms: u64,
	#[serde(default = "default_stop_timeout")]
	pub stop_timeout_ms: u64,
}

fn default_respawn_delay() -> u64 {
	1000
}
fn default_max_log_lines() -> usize {
	100
}
fn default_poll_interval() -> u64 {
	1000
}
fn default_read_timeout() -> u64 {
	100
}
fn default_stop_timeout() -> u64 {
	3000
}

impl SupervisorConfig {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			respawn_delay_ms: default_respawn_delay(),
			apn: Vec::new(),
			max_log_lines: default_max_log_lines(),
			poll_interval_ms: default_poll_interval(),
			read_timeout_ms: default_read_timeout(),
			stop_timeout_ms: default_stop_timeout(),
		}
	}

	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.path.as_os_str().is_empty() {
			return Err(ConfigError::Invalid("path must not be empty".into()));
		}
		if self.max_log_lines == 0 {
			return Err(ConfigError::Invalid("max_log_lines must be at least 1".into()));
		}
		if self.poll_interval_ms == 0 {
			return Err(ConfigError::Invalid("poll_interval_ms must be positive".into()));
		}
		Ok(())
	}

	pub fn respawn_delay(&self) -> Duration {
		Duration::from_millis(self.respawn_delay_ms)
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}

	pub fn read_timeout(&self) -> Duration {
		Duration::from_millis(self.read_timeout_ms)
	}

	pub fn stop_timeout(&self) -> Duration {
		Duration::from_millis(self.stop_timeout_ms)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_fill_missing_fields() {
		let config: SupervisorConfig = toml::from_str(r#"path = "/usr/bin/quectel-CM""#).unwrap();
		assert_eq!(config, SupervisorConfig::new("/usr/bin/quectel-CM"));
		assert_eq!(config.poll_interval(), Duration::from_secs(1));
		assert_eq!(config.read_timeout(), Duration::from_millis(100));
	}

	#[test]
	fn apn_passes_through() {
		let config: SupervisorConfig = toml::from_str(
			r#"
			path = "/usr/bin/quectel-CM"
			respawn_delay_ms = 5000
			apn = ["-s", "internet", "user", "secret", "2"]
			max_log_lines = 50
			"#,
		)
		.unwrap();
		assert_eq!(config.apn, vec!["-s", "internet", "user", "secret", "2"]);
		assert_eq!(config.respawn_delay(), Duration::from_secs(5));
		assert_eq!(config.max_log_lines, 50);
	}

	#[test]
	fn missing_path_is_a_parse_error() {
		assert!(toml::from_str::<SupervisorConfig>("max_log_lines = 3").is_err());
	}

	#[test]
	fn validate_rejects_zero_capacity() {
		let mut config = SupervisorConfig::new("/bin/true");
		config.max_log_lines = 0;
		assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
	}

	#[test]
	fn validate_rejects_zero_poll_interval() {
		let mut config = SupervisorConfig::new("/bin/true");
		config.poll_interval_ms = 0;
		assert!(config.validate().is_err());
	}

	#[test]
	fn load_reports_missing_file() {
		let err = SupervisorConfig::load(Path::new("/nonexistent/cmkeeper.toml")).unwrap_err();
		assert!(matches!(err, ConfigError::Read { .. }));
	}
}
