use std::path::Path;
use std::process::Stdio;
use std::time::SystemTime;
use tokio::process::{Child, Command};

use crate::config::SupervisorConfig;
use crate::error::SupervisorError;
use crate::reader::LineReader;

/// A live child together with the reader draining its output.
pub struct Launched {
	pub child: Child,
	pub pid: u32,
	pub started_at: SystemTime,
	pub output: LineReader,
}

/// Pre-spawn check: the binary must exist as a regular file.
pub fn executable_exists(path: &Path) -> bool {
	path.is_file()
}

pub fn launch(config: &SupervisorConfig) -> Result<Launched, SupervisorError> {
	let mut cmd = Command::new(&config.path);
	cmd.args(&config.apn)
		.stdin(Stdio::piped())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.kill_on_drop(true);

	let mut child = cmd.spawn().map_err(|source| SupervisorError::Spawn {
		path: config.path.clone(),
		source,
	})?;

	let pid = child.id().unwrap_or(0);
	let mut output = LineReader::new();
	if let Some(stdout) = child.stdout.take() {
		output.attach(stdout);
	}
	if let Some(stderr) = child.stderr.take() {
		output.attach(stderr);
	}

	Ok(Launched {
		child,
		pid,
		started_at: SystemTime::now(),
		output,
	})
}

/// Maps an exit status to a code, using `-signal` for signal deaths.
pub fn exit_code(status: &std::process::ExitStatus) -> i32 {
	use std::os::unix::process::ExitStatusExt;
	match (status.code(), status.signal()) {
		(Some(code), _) => code,
		(None, Some(signal)) => -signal,
		(None, None) => -1,
	}
}

pub fn describe_exit(code: i32) -> String {
	if code < 0 {
		match nix::sys::signal::Signal::try_from(-code) {
			Ok(signal) => format!("signal {}", signal.as_str()),
			Err(_) => format!("code {}", code),
		}
	} else {
		format!("code {}", code)
	}
}
