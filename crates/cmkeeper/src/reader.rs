//! Non-blocking line reader over a child's output pipes.
//!
//! Each attached stream is pumped by its own task into one channel, so the
//! supervision loop can ask for "one line within this timeout" without ever
//! blocking on a quiet process.

use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct LineReader {
	sender: mpsc::UnboundedSender<Vec<u8>>,
	receiver: mpsc::UnboundedReceiver<Vec<u8>>,
	pumps: Vec<JoinHandle<()>>,
}

impl LineReader {
	pub fn new() -> Self {
		let (sender, receiver) = mpsc::unbounded_channel();
		Self {
			sender,
			receiver,
			pumps: Vec::new(),
		}
	}

	/// Starts pumping lines from `stream`. Lines keep their raw bytes, minus the `\n`.
	pub fn attach<R>(&mut self, stream: R)
	where
		R: AsyncRead + Unpin + Send + 'static,
	{
		let sender = self.sender.clone();
		self.pumps.push(tokio::spawn(async move {
			pump_lines(stream, sender).await;
		}));
	}

	/// Returns the next complete line if one arrives within `timeout`.
	pub async fn readline(&mut self, timeout: Duration) -> Option<Vec<u8>> {
		match tokio::time::timeout(timeout, self.receiver.recv()).await {
			Ok(line) => line,
			Err(_) => None,
		}
	}
}

impl Default for LineReader {
	fn default() -> Self {
		Self::new()
	}
}

impl Drop for LineReader {
	fn drop(&mut self) {
		for pump in &self.pumps {
			pump.abort();
		}
	}
}

async fn pump_lines<R: AsyncRead + Unpin>(stream: R, sender: mpsc::UnboundedSender<Vec<u8>>) {
	let mut lines = BufReader::new(stream).split(b'\n');
	loop {
		match lines.next_segment().await {
			Ok(Some(line)) => {
				if sender.send(line).is_err() {
					break;
				}
			}
			Ok(None) => break,
			Err(e) => {
				tracing::debug!("output pipe closed: {}", e);
				break;
			}
		}
	}
}

/// Decodes a raw output line for the log ring.
pub fn decode_line(raw: &[u8]) -> String {
	String::from_utf8_lossy(raw).trim().to_string()
}
