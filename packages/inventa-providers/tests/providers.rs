use std::{
	future::IntoFuture,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
};

use axum::{
	Json, Router,
	extract::State,
	http::{HeaderMap, StatusCode},
	response::IntoResponse,
	routing,
};
use reqwest::header::AUTHORIZATION;
use serde_json::{Map, Value};
use tokio::{
	net::TcpListener,
	sync::{oneshot, oneshot::Sender},
};

use inventa_config::EmbeddingProviderConfig;

#[derive(Clone)]
struct StubState {
	calls: Arc<AtomicUsize>,
	fail_with: Option<StatusCode>,
}

async fn start_embed_server(state: StubState) -> (String, Sender<()>) {
	let app = Router::new().route("/embeddings", routing::post(embed_handler)).with_state(state);
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind embed server.");
	let addr = listener.local_addr().expect("Failed to read embed server address.");
	let (tx, rx) = oneshot::channel();
	let server = axum::serve(listener, app).with_graceful_shutdown(async move {
		let _ = rx.await;
	});

	tokio::spawn(async move {
		let _ = server.into_future().await;
	});

	(format!("http://{addr}"), tx)
}

async fn embed_handler(
	State(state): State<StubState>,
	headers: HeaderMap,
	Json(payload): Json<Value>,
) -> impl IntoResponse {
	state.calls.fetch_add(1, Ordering::SeqCst);

	if let Some(status) = state.fail_with {
		return status.into_response();
	}
	if headers.get("authorization").and_then(|value| value.to_str().ok()) != Some("Bearer key") {
		return StatusCode::UNAUTHORIZED.into_response();
	}

	let inputs =
		payload.get("input").and_then(|value| value.as_array()).cloned().unwrap_or_default();
	// Reversed on purpose so the client has to reorder by index.
	let data = inputs
		.iter()
		.enumerate()
		.rev()
		.map(|(index, _)| serde_json::json!({ "index": index, "embedding": [index as f32, 1.0] }))
		.collect::<Vec<_>>();

	(StatusCode::OK, Json(serde_json::json!({ "data": data }))).into_response()
}

fn config(api_base: String) -> EmbeddingProviderConfig {
	EmbeddingProviderConfig {
		provider_id: "stub".to_string(),
		api_base,
		api_key: "key".to_string(),
		path: "/embeddings".to_string(),
		model: "stub-embedding".to_string(),
		dimensions: 2,
		timeout_ms: 5_000,
		default_headers: Map::new(),
	}
}

#[test]
fn builds_bearer_auth_header() {
	let headers =
		inventa_providers::auth_headers("secret", &Map::new()).expect("Failed to build headers.");
	let value = headers.get(AUTHORIZATION).expect("Missing authorization header.");

	assert_eq!(value, "Bearer secret");
}

#[test]
fn rejects_non_string_default_headers() {
	let mut default_headers = Map::new();

	default_headers.insert("X-Retries".to_string(), Value::from(3));

	assert!(inventa_providers::auth_headers("secret", &default_headers).is_err());
}

#[tokio::test]
async fn embeds_each_input_in_order() {
	let calls = Arc::new(AtomicUsize::new(0));
	let (api_base, shutdown) =
		start_embed_server(StubState { calls: calls.clone(), fail_with: None }).await;
	let texts = vec!["first".to_string(), "second".to_string(), "third".to_string()];
	let vectors = inventa_providers::embedding::embed(&config(api_base), &texts)
		.await
		.expect("Embedding call failed.");

	assert_eq!(vectors, vec![vec![0.0, 1.0], vec![1.0, 1.0], vec![2.0, 1.0]]);
	assert_eq!(calls.load(Ordering::SeqCst), 1);

	let _ = shutdown.send(());
}

#[tokio::test]
async fn empty_input_skips_the_remote_call() {
	let calls = Arc::new(AtomicUsize::new(0));
	let (api_base, shutdown) =
		start_embed_server(StubState { calls: calls.clone(), fail_with: None }).await;
	let vectors =
		inventa_providers::embedding::embed(&config(api_base), &[]).await.expect("Embed failed.");

	assert!(vectors.is_empty());
	assert_eq!(calls.load(Ordering::SeqCst), 0);

	let _ = shutdown.send(());
}

#[tokio::test]
async fn server_errors_are_transient() {
	let calls = Arc::new(AtomicUsize::new(0));
	let (api_base, shutdown) = start_embed_server(StubState {
		calls,
		fail_with: Some(StatusCode::SERVICE_UNAVAILABLE),
	})
	.await;
	let err = inventa_providers::embedding::embed(&config(api_base), &["text".to_string()])
		.await
		.expect_err("Expected the stub failure to surface.");

	assert!(err.is_transient());

	let _ = shutdown.send(());
}

#[tokio::test]
async fn client_errors_are_not_transient() {
	let calls = Arc::new(AtomicUsize::new(0));
	let (api_base, shutdown) =
		start_embed_server(StubState { calls, fail_with: Some(StatusCode::BAD_REQUEST) }).await;
	let err = inventa_providers::embedding::embed(&config(api_base), &["text".to_string()])
		.await
		.expect_err("Expected the stub failure to surface.");

	assert!(!err.is_transient());

	let _ = shutdown.send(());
}
