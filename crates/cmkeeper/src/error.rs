use std::path::PathBuf;

/// Faults surfaced by the supervisor.
///
/// Expected lifecycle events (process exits, forced restarts, a kill that
/// finds no process) are never reported through this type.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum SupervisorError {
	#[error("supervisor already started")]
	AlreadyStarted,

	#[error("supervisor was never started")]
	NotStarted,

	#[error("failed to spawn {}: {source}", .path.display())]
	Spawn {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("process I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("supervision task panicked: {0}")]
	Panicked(String),

	#[error(transparent)]
	Config(#[from] ConfigError),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
	#[error("failed to read {}: {source}", .path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse {}: {source}", .path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("invalid configuration: {0}")]
	Invalid(String),
}

pub type Result<T, E = SupervisorError> = std::result::Result<T, E>;
