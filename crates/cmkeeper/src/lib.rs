//! # cmkeeper
//!
//! Keeps a modem connection manager (e.g. `quectel-CM`) running.
//!
//! The supervisor launches the binary, drains its stdout/stderr into a
//! bounded log ring, and relaunches it after a configurable delay whenever
//! it exits. The ring and the current state can be read at any time from
//! other tasks.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use cmkeeper::{Supervisor, SupervisorConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), cmkeeper::SupervisorError> {
//! let mut config = SupervisorConfig::new("/usr/bin/quectel-CM");
//! config.apn = vec!["-s".into(), "internet".into()];
//! config.respawn_delay_ms = 5000;
//!
//! let sup = Supervisor::new(config)?;
//! sup.start().await?;
//!
//! for line in sup.snapshot_log().await {
//!     println!("{}", line);
//! }
//!
//! sup.stop();
//! sup.wait().await?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod launcher;
pub mod reader;
pub mod ring;
pub mod supervisor;
pub mod types;

pub use config::SupervisorConfig;
pub use error::{ConfigError, SupervisorError};
pub use reader::LineReader;
pub use ring::LogRing;
pub use supervisor::Supervisor;
pub use types::*;
