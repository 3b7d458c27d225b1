use std::collections::VecDeque;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tokio::sync::Mutex;

use crate::types::LogLine;

const FOLLOW_CHANNEL_SIZE: usize = 256;

/// Bounded, order-preserving buffer of the most recent output lines.
///
/// Cloning shares the same buffer. The lock is only held while a line is
/// pushed or while a snapshot is copied out.
#[derive(Clone)]
pub struct LogRing {
	lines: Arc<Mutex<VecDeque<LogLine>>>,
	capacity: usize,
	sender: broadcast::Sender<LogLine>,
}

impl LogRing {
	pub fn new(capacity: usize) -> Self {
		let capacity = capacity.max(1);
		let (sender, _) = broadcast::channel(FOLLOW_CHANNEL_SIZE);
		Self {
			lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
			capacity,
			sender,
		}
	}

	pub async fn append(&self, text: impl Into<String>) {
		let line = LogLine {
			at: SystemTime::now(),
			text: text.into(),
		};
		tracing::info!("CM: {}", line.text);

		{
			let mut lines = self.lines.lock().await;
			lines.push_back(line.clone());
			while lines.len() > self.capacity {
				lines.pop_front();
			}
		}

		let _ = self.sender.send(line);
	}

	pub async fn snapshot(&self) -> Vec<LogLine> {
		let lines = self.lines.lock().await;
		lines.iter().cloned().collect()
	}

	pub async fn snapshot_text(&self) -> Vec<String> {
		let lines = self.lines.lock().await;
		lines.iter().map(|l| l.text.clone()).collect()
	}

	/// Lines appended after this call. Slow receivers lag rather than block appends.
	pub fn subscribe(&self) -> broadcast::Receiver<LogLine> {
		self.sender.subscribe()
	}
}
