mod api;
mod config;

use cmkeeper::{StopReason, Supervisor, SupervisorError};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::config::DaemonConfig;

#[tokio::main]
async fn main() -> ExitCode {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.init();

	let args: Vec<String> = std::env::args().skip(1).collect();
	let config_path = config::config_path(&args);
	let config = match DaemonConfig::load(&config_path) {
		Ok(c) => c,
		Err(e) => {
			tracing::error!("{}", e);
			return ExitCode::FAILURE;
		}
	};
	let enable_http = config.http.enabled && !args.iter().any(|a| a == "--no-http");

	let supervisor = match Supervisor::new(config.supervisor.clone()) {
		Ok(s) => s,
		Err(e) => {
			tracing::error!("{}", e);
			return ExitCode::FAILURE;
		}
	};

	if config.autostart {
		if let Err(e) = supervisor.start().await {
			tracing::error!("failed to start supervision: {}", e);
			return ExitCode::FAILURE;
		}
	}

	let mut http_handle = if enable_http {
		let sup_http = Arc::clone(&supervisor);
		let http = config.http.clone();
		Some(tokio::spawn(async move {
			run_http_server(sup_http, &http.bind, http.port).await;
		}))
	} else {
		None
	};

	tracing::info!("daemon started (pid {})", std::process::id());

	let monitor = watch_supervision(Arc::clone(&supervisor));
	tokio::pin!(monitor);
	let mut supervision_done = false;

	loop {
		tokio::select! {
			outcome = &mut monitor, if !supervision_done => {
				supervision_done = true;
				match outcome {
					Ok(StopReason::Stopped) => tracing::info!("supervision stopped"),
					Ok(StopReason::MissingExecutable) => {
						tracing::error!("supervision ended: executable missing");
					}
					Err(e) => {
						tracing::error!("supervision failed: {}", e);
						return ExitCode::FAILURE;
					}
				}
				if http_handle.is_none() {
					return ExitCode::SUCCESS;
				}
			}
			_ = async {
				match http_handle.as_mut() {
					Some(h) => { let _ = h.await; }
					None => std::future::pending::<()>().await,
				}
			} => {
				tracing::error!("HTTP server exited");
				supervisor.stop();
				return ExitCode::FAILURE;
			}
			_ = tokio::signal::ctrl_c() => {
				tracing::info!("shutting down");
				let was_supervising = supervisor.is_supervising();
				supervisor.stop();
				if needs_grace(was_supervising, supervision_done) {
					let grace = supervisor.config().stop_timeout() + supervisor.config().poll_interval();
					let _ = tokio::time::timeout(grace, &mut monitor).await;
				}
				return ExitCode::SUCCESS;
			}
		}
	}
}

/// Only a loop that was running has a child to wind down on shutdown.
fn needs_grace(was_supervising: bool, supervision_done: bool) -> bool {
	was_supervising && !supervision_done
}

/// Resolves once the supervision task ends. Tolerates supervision that is
/// only started later through the API.
async fn watch_supervision(supervisor: Arc<Supervisor>) -> Result<StopReason, SupervisorError> {
	loop {
		match supervisor.wait().await {
			Err(SupervisorError::NotStarted) => tokio::time::sleep(Duration::from_millis(500)).await,
			other => return other,
		}
	}
}

async fn run_http_server(supervisor: Arc<Supervisor>, bind: &str, port: u16) {
	let app = api::router(supervisor);
	let addr = format!("{}:{}", bind, port);
	let listener = match tokio::net::TcpListener::bind(&addr).await {
		Ok(l) => l,
		Err(e) => {
			tracing::error!("failed to bind HTTP on {}: {}", addr, e);
			return;
		}
	};
	tracing::info!("HTTP listening on {}", addr);
	if let Err(e) = axum::serve(listener, app).await {
		tracing::error!("HTTP server error: {}", e);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use cmkeeper::SupervisorConfig;

	#[test]
	fn shutdown_skips_grace_when_never_started() {
		assert!(!needs_grace(false, false));
		assert!(!needs_grace(true, true));
		assert!(needs_grace(true, false));
	}

	#[tokio::test]
	async fn unstarted_supervisor_reports_not_supervising() {
		let supervisor = Supervisor::new(SupervisorConfig::new("/bin/true")).unwrap();
		assert!(!needs_grace(supervisor.is_supervising(), false));

		supervisor.start().await.unwrap();
		assert!(needs_grace(supervisor.is_supervising(), false));
		supervisor.stop();
		assert!(supervisor.wait().await.is_ok());
	}
}
