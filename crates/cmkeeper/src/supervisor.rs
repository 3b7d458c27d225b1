use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::clock;
use crate::config::SupervisorConfig;
use crate::error::{Result, SupervisorError};
use crate::launcher::{self, Launched};
use crate::reader::{self, LineReader};
use crate::ring::LogRing;
use crate::types::{LogLine, StopReason, SupervisionState};

/// Keeps one connection manager process alive and collects its output.
///
/// The process handle lives inside the background task. Callers talk to it
/// through the supervising flag (`start`/`stop`) and a kill-request channel
/// (`restart`), so nothing outside the loop ever touches the child.
pub struct Supervisor {
	config: SupervisorConfig,
	log: LogRing,
	state: Arc<RwLock<Tracked>>,
	supervising: Arc<watch::Sender<bool>>,
	kill_requests: mpsc::UnboundedSender<u64>,
	control: Mutex<Control>,
}

/// Current state plus the launch it belongs to. Every launch attempt bumps
/// `generation`, and kill requests carry the generation they target.
struct Tracked {
	state: SupervisionState,
	generation: u64,
}

struct Control {
	kill_rx: Option<mpsc::UnboundedReceiver<u64>>,
	task: Option<JoinHandle<Result<StopReason>>>,
}

impl Supervisor {
	pub fn new(config: SupervisorConfig) -> Result<Arc<Self>> {
		config.validate()?;
		let (supervising, _) = watch::channel(false);
		let (kill_requests, kill_rx) = mpsc::unbounded_channel();
		Ok(Arc::new(Self {
			log: LogRing::new(config.max_log_lines),
			config,
			state: Arc::new(RwLock::new(Tracked {
				state: SupervisionState::Stopped,
				generation: 0,
			})),
			supervising: Arc::new(supervising),
			kill_requests,
			control: Mutex::new(Control {
				kill_rx: Some(kill_rx),
				task: None,
			}),
		}))
	}

	pub fn config(&self) -> &SupervisorConfig {
		&self.config
	}

	/// Spawns the supervision loop and returns immediately.
	///
	/// A supervisor runs at most once; a second call fails with
	/// [`SupervisorError::AlreadyStarted`].
	pub async fn start(&self) -> Result<()> {
		let mut control = self.control.lock().await;
		let kill_rx = control.kill_rx.take().ok_or(SupervisorError::AlreadyStarted)?;

		tracing::info!("starting supervision of {}", self.config.path.display());
		self.supervising.send_replace(true);

		let worker = Worker {
			config: self.config.clone(),
			log: self.log.clone(),
			state: Arc::clone(&self.state),
			stop_signal: self.supervising.subscribe(),
			supervising: Arc::clone(&self.supervising),
			kill_requests: kill_rx,
			generation: 0,
		};
		control.task = Some(tokio::spawn(worker.run()));
		Ok(())
	}

	/// Asks the loop to halt at its next wait boundary. Never kills anything itself.
	pub fn stop(&self) {
		if self.supervising.send_replace(false) {
			tracing::info!("stop requested for {}", self.config.path.display());
		}
	}

	/// Records the restart and asks the loop to kill the current process.
	///
	/// A process that is still being launched counts as current. With no
	/// process at all this only logs the attempt.
	pub async fn restart(&self) {
		self.log
			.append(format!(" *** KILLED due to restart @ {}", clock::now()))
			.await;

		let target = {
			let tracked = self.state.read().await;
			match tracked.state {
				SupervisionState::Starting | SupervisionState::Running { .. } => Some(tracked.generation),
				_ => None,
			}
		};
		match target {
			Some(generation) => {
				if self.kill_requests.send(generation).is_err() {
					tracing::debug!("restart requested after supervision ended");
				}
			}
			None => tracing::info!("restart requested but no process is running"),
		}
	}

	pub fn is_supervising(&self) -> bool {
		*self.supervising.borrow()
	}

	pub async fn current_state(&self) -> SupervisionState {
		self.state.read().await.state.clone()
	}

	pub async fn snapshot_log(&self) -> Vec<String> {
		self.log.snapshot_text().await
	}

	pub async fn snapshot_log_lines(&self) -> Vec<LogLine> {
		self.log.snapshot().await
	}

	pub fn log(&self) -> &LogRing {
		&self.log
	}

	/// Waits for the supervision task to finish and reports how it ended.
	///
	/// Faults inside the loop (including panics) come back as `Err`. The
	/// outcome can be collected once.
	pub async fn wait(&self) -> Result<StopReason> {
		let task = self
			.control
			.lock()
			.await
			.task
			.take()
			.ok_or(SupervisorError::NotStarted)?;

		match task.await {
			Ok(result) => result,
			Err(e) => Err(SupervisorError::Panicked(e.to_string())),
		}
	}
}

impl Drop for Supervisor {
	fn drop(&mut self) {
		self.supervising.send_replace(false);
	}
}

enum Exit {
	Terminated(i32),
	StopRequested(i32),
}

struct Worker {
	config: SupervisorConfig,
	log: LogRing,
	state: Arc<RwLock<Tracked>>,
	stop_signal: watch::Receiver<bool>,
	supervising: Arc<watch::Sender<bool>>,
	kill_requests: mpsc::UnboundedReceiver<u64>,
	generation: u64,
}

impl Worker {
	async fn run(mut self) -> Result<StopReason> {
		let result = self.supervise().await;

		match &result {
			Ok(reason) => {
				tracing::info!("supervision of {} ended: {:?}", self.config.path.display(), reason)
			}
			Err(e) => {
				tracing::error!("error supervising CM {}: {}", self.config.path.display(), e);
				self.log
					.append(format!(" *** FAULT @ {}: {}", clock::now(), e))
					.await;
			}
		}

		self.supervising.send_replace(false);
		self.set_state(SupervisionState::Stopped).await;
		result
	}

	async fn supervise(&mut self) -> Result<StopReason> {
		while *self.stop_signal.borrow() {
			if !launcher::executable_exists(&self.config.path) {
				tracing::error!(
					"connection manager path {} does not exist - cannot start",
					self.config.path.display()
				);
				self.log
					.append(format!(
						" *** ERROR executable {} does not exist @ {}",
						self.config.path.display(),
						clock::now()
					))
					.await;
				return Ok(StopReason::MissingExecutable);
			}

			self.begin_launch().await;
			tracing::info!("starting connection manager {}...", self.config.path.display());
			let mut launched = launcher::launch(&self.config)?;

			self.log
				.append(format!(
					" *** STARTED PID {} @ {}",
					launched.pid,
					clock::format_timestamp(launched.started_at)
				))
				.await;
			self.set_state(SupervisionState::Running {
				pid: launched.pid,
				started_at: launched.started_at,
			})
			.await;

			let exit = self.monitor(&mut launched).await?;
			let code = match exit {
				Exit::Terminated(code) | Exit::StopRequested(code) => code,
			};
			self.record_termination(code).await;

			match exit {
				Exit::Terminated(_) => {
					tracing::warn!(
						"connection manager terminated with {} - waiting {}ms before relaunch...",
						launcher::describe_exit(code),
						self.config.respawn_delay_ms
					);
					if !self.respawn_wait().await {
						break;
					}
				}
				Exit::StopRequested(_) => break,
			}
		}

		self.log
			.append(format!(" *** STOPPED @ {}", clock::now()))
			.await;
		Ok(StopReason::Stopped)
	}

	async fn monitor(&mut self, launched: &mut Launched) -> Result<Exit> {
		loop {
			let keep_going = self.poll_wait(launched).await;

			drain(&self.log, &mut launched.output, &self.config).await;

			if let Some(status) = launched.child.try_wait()? {
				drain(&self.log, &mut launched.output, &self.config).await;
				return Ok(Exit::Terminated(launcher::exit_code(&status)));
			}

			if !keep_going {
				let code = self.shutdown(launched).await?;
				return Ok(Exit::StopRequested(code));
			}
		}
	}

	/// Sleeps one poll interval. Returns false if `stop()` was observed.
	async fn poll_wait(&mut self, launched: &mut Launched) -> bool {
		tokio::select! {
			_ = tokio::time::sleep(self.config.poll_interval()) => true,
			_ = self.stop_signal.wait_for(|running| !running) => false,
			Some(generation) = self.kill_requests.recv() => {
				if generation == self.generation {
					kill_for_restart(launched);
				} else {
					tracing::debug!("ignoring stale kill request for launch {}", generation);
				}
				true
			}
		}
	}

	/// Sleeps the respawn delay. Returns false if `stop()` was observed.
	async fn respawn_wait(&mut self) -> bool {
		let stopped = tokio::select! {
			_ = tokio::time::sleep(self.config.respawn_delay()) => false,
			_ = self.stop_signal.wait_for(|running| !running) => true,
		};
		!stopped && *self.stop_signal.borrow()
	}

	async fn shutdown(&mut self, launched: &mut Launched) -> Result<i32> {
		use nix::sys::signal::{kill, Signal};
		use nix::unistd::Pid;

		tracing::info!("stopping connection manager (pid {})", launched.pid);
		if launched.pid > 0 {
			let _ = kill(Pid::from_raw(launched.pid as i32), Signal::SIGTERM);
		}

		let status =
			match tokio::time::timeout(self.config.stop_timeout(), launched.child.wait()).await {
				Ok(status) => status?,
				Err(_) => {
					tracing::warn!("pid {} ignored SIGTERM, killing", launched.pid);
					let _ = launched.child.start_kill();
					launched.child.wait().await?
				}
			};

		drain(&self.log, &mut launched.output, &self.config).await;
		Ok(launcher::exit_code(&status))
	}

	async fn record_termination(&self, code: i32) {
		let at = SystemTime::now();
		self.log
			.append(format!(
				" *** TERMINATED @ {} with exit code {}",
				clock::format_timestamp(at),
				code
			))
			.await;
		self.set_state(SupervisionState::Terminated { exit_code: code, at })
			.await;
	}

	async fn set_state(&self, state: SupervisionState) {
		self.state.write().await.state = state;
	}

	/// Moves to `Starting` under a fresh generation. Both change under one
	/// lock so `restart()` never pairs `Starting` with an older generation.
	async fn begin_launch(&mut self) {
		let mut tracked = self.state.write().await;
		tracked.generation += 1;
		tracked.state = SupervisionState::Starting;
		self.generation = tracked.generation;
	}
}

async fn drain(log: &LogRing, output: &mut LineReader, config: &SupervisorConfig) {
	while let Some(raw) = output.readline(config.read_timeout()).await {
		log.append(reader::decode_line(&raw)).await;
	}
}

fn kill_for_restart(launched: &mut Launched) {
	match launched.child.start_kill() {
		Ok(()) => tracing::warn!("killed pid {} for restart", launched.pid),
		Err(e) => tracing::debug!("pid {} already gone: {}", launched.pid, e),
	}
}
