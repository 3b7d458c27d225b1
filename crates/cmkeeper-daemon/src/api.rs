use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use cmkeeper::{clock, LogLine, Supervisor, SupervisionState};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
	pub supervisor: Arc<Supervisor>,
}

pub fn router(supervisor: Arc<Supervisor>) -> Router {
	let state = AppState { supervisor };

	Router::new()
		.route("/api/status", get(status))
		.route("/api/log", get(log))
		.route("/api/log/text", get(log_text))
		.route("/api/start", post(start))
		.route("/api/stop", post(stop))
		.route("/api/restart", post(restart))
		.route("/ws/log", get(ws_log))
		.layer(CorsLayer::permissive())
		.with_state(state)
}

#[derive(Serialize)]
struct StatusResponse {
	path: String,
	supervising: bool,
	state: &'static str,
	description: String,
	pid: Option<u32>,
	exit_code: Option<i32>,
	since: Option<String>,
}

#[derive(Serialize)]
struct LogEntry {
	at: String,
	text: String,
}

impl From<LogLine> for LogEntry {
	fn from(line: LogLine) -> Self {
		Self {
			at: clock::format_timestamp(line.at),
			text: line.text,
		}
	}
}

#[derive(Serialize)]
struct ActionResponse {
	message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
	error: String,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
	let sup = &state.supervisor;
	let current = sup.current_state().await;

	let (name, pid, exit_code, since) = match &current {
		SupervisionState::Stopped => ("stopped", None, None, None),
		SupervisionState::Starting => ("starting", None, None, None),
		SupervisionState::Running { pid, started_at } => {
			("running", Some(*pid), None, Some(clock::format_timestamp(*started_at)))
		}
		SupervisionState::Terminated { exit_code, at } => {
			("terminated", None, Some(*exit_code), Some(clock::format_timestamp(*at)))
		}
	};

	Json(StatusResponse {
		path: sup.config().path.to_string_lossy().to_string(),
		supervising: sup.is_supervising(),
		state: name,
		description: current.describe(),
		pid,
		exit_code,
		since,
	})
}

async fn log(State(state): State<AppState>) -> Json<Vec<LogEntry>> {
	let lines = state.supervisor.snapshot_log_lines().await;
	Json(lines.into_iter().map(LogEntry::from).collect())
}

async fn log_text(State(state): State<AppState>) -> String {
	let mut text = state.supervisor.snapshot_log().await.join("\n");
	if !text.is_empty() {
		text.push('\n');
	}
	text
}

async fn start(
	State(state): State<AppState>,
) -> Result<Json<ActionResponse>, (StatusCode, Json<ErrorResponse>)> {
	state
		.supervisor
		.start()
		.await
		.map(|_| Json(ActionResponse {
			message: "supervision started".to_string(),
		}))
		.map_err(|e| {
			(
				StatusCode::CONFLICT,
				Json(ErrorResponse { error: e.to_string() }),
			)
		})
}

async fn stop(State(state): State<AppState>) -> Json<ActionResponse> {
	state.supervisor.stop();
	Json(ActionResponse {
		message: "stop requested".to_string(),
	})
}

async fn restart(State(state): State<AppState>) -> Json<ActionResponse> {
	state.supervisor.restart().await;
	Json(ActionResponse {
		message: "restart requested".to_string(),
	})
}

async fn ws_log(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
	ws.on_upgrade(move |socket| handle_ws_log(socket, state))
}

async fn handle_ws_log(mut socket: WebSocket, state: AppState) {
	let mut rx = state.supervisor.log().subscribe();

	for line in state.supervisor.snapshot_log().await {
		if socket.send(Message::Text(line.into())).await.is_err() {
			return;
		}
	}

	loop {
		match rx.recv().await {
			Ok(line) => {
				if socket.send(Message::Text(line.text.into())).await.is_err() {
					break;
				}
			}
			Err(RecvError::Lagged(skipped)) => {
				tracing::debug!("log follower lagged by {} lines", skipped);
			}
			Err(RecvError::Closed) => break,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::Body;
	use axum::http::Request;
	use cmkeeper::SupervisorConfig;
	use tower::ServiceExt;

	fn test_router(path: &str) -> (Router, Arc<Supervisor>) {
		let mut config = SupervisorConfig::new(path);
		config.poll_interval_ms = 50;
		let sup = Supervisor::new(config).unwrap();
		(router(Arc::clone(&sup)), sup)
	}

	async fn body_json(response: axum::response::Response) -> serde_json::Value {
		let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
		serde_json::from_slice(&bytes).unwrap()
	}

	fn post_request(uri: &str) -> Request<Body> {
		Request::builder()
			.method("POST")
			.uri(uri)
			.body(Body::empty())
			.unwrap()
	}

	#[tokio::test]
	async fn status_reports_stopped_before_start() {
		let (app, _sup) = test_router("/bin/true");
		let response = app
			.oneshot(Request::builder().uri("/api/status").body(Body::empty()).unwrap())
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);

		let json = body_json(response).await;
		assert_eq!(json["state"], "stopped");
		assert_eq!(json["supervising"], false);
		assert_eq!(json["path"], "/bin/true");
		assert!(json["pid"].is_null());
	}

	#[tokio::test]
	async fn restart_without_process_logs_attempt() {
		let (app, sup) = test_router("/bin/true");
		let response = app.oneshot(post_request("/api/restart")).await.unwrap();
		assert_eq!(response.status(), StatusCode::OK);

		let log = sup.snapshot_log().await;
		assert_eq!(log.len(), 1);
		assert!(log[0].contains("KILLED due to restart"));
	}

	#[tokio::test]
	async fn second_start_conflicts() {
		let (app, sup) = test_router("/nonexistent");
		let first = app.clone().oneshot(post_request("/api/start")).await.unwrap();
		assert_eq!(first.status(), StatusCode::OK);

		let second = app.oneshot(post_request("/api/start")).await.unwrap();
		assert_eq!(second.status(), StatusCode::CONFLICT);
		let json = body_json(second).await;
		assert_eq!(json["error"], "supervisor already started");

		let _ = sup.wait().await;
	}

	#[tokio::test]
	async fn log_endpoints_return_ring_contents() {
		let (app, sup) = test_router("/bin/true");
		sup.log().append("first").await;
		sup.log().append("second").await;

		let response = app
			.clone()
			.oneshot(Request::builder().uri("/api/log").body(Body::empty()).unwrap())
			.await
			.unwrap();
		let json = body_json(response).await;
		assert_eq!(json[0]["text"], "first");
		assert_eq!(json[1]["text"], "second");
		assert!(json[0]["at"].as_str().unwrap().len() >= 19);

		let response = app
			.oneshot(Request::builder().uri("/api/log/text").body(Body::empty()).unwrap())
			.await
			.unwrap();
		let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
		assert_eq!(&bytes[..], b"first\nsecond\n");
	}

	#[tokio::test]
	async fn stop_clears_supervising_flag() {
		let (app, sup) = test_router("/nonexistent");
		sup.start().await.unwrap();
		let response = app.oneshot(post_request("/api/stop")).await.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		assert!(!sup.is_supervising());
		assert!(sup.wait().await.is_ok());
	}
}
