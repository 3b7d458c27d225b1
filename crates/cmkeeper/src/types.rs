use std::time::SystemTime;

use crate::clock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisionState {
	Stopped,
	Starting,
	Running { pid: u32, started_at: SystemTime },
	Terminated { exit_code: i32, at: SystemTime },
}

impl SupervisionState {
	pub fn is_running(&self) -> bool {
		matches!(self, SupervisionState::Running { .. })
	}

	pub fn pid(&self) -> Option<u32> {
		match self {
			SupervisionState::Running { pid, .. } => Some(*pid),
			_ => None,
		}
	}

	pub fn describe(&self) -> String {
		match self {
			SupervisionState::Stopped => "stopped".to_string(),
			SupervisionState::Starting => "starting".to_string(),
			SupervisionState::Running { pid, started_at } => {
				format!("running (pid {}, since {})", pid, clock::format_timestamp(*started_at))
			}
			SupervisionState::Terminated { exit_code, at } => {
				format!("terminated (exit {} @ {})", exit_code, clock::format_timestamp(*at))
			}
		}
	}
}

/// One entry of the log ring. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
	pub at: SystemTime,
	pub text: String,
}

/// Why the supervision task finished without a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
	/// `stop()` was observed by the loop.
	Stopped,
	/// The executable was missing before a spawn.
	MissingExecutable,
}
