//! HTTP API for submitting relay requests and tracking their receipts.

use axum::{
	extract::{Path, State},
	http::StatusCode,
	response::{IntoResponse, Json, Response},
	routing::{get, post},
	Router,
};
use relay_core::{RelayEngine, RelayError, RelayOutcome, ReplayError};
use relay_types::{Address, RelayReceipt, SignedForwardRequest, TxHash};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
	pub engine: Arc<RelayEngine>,
}

/// Errors returned by API handlers.
#[derive(Debug)]
pub enum ApiError {
	Relay(RelayError),
	BadRequest(String),
	NotFound(String),
}

impl From<RelayError> for ApiError {
	fn from(error: RelayError) -> Self {
		ApiError::Relay(error)
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let (status, body) = match &self {
			ApiError::Relay(error) => relay_error_body(error),
			ApiError::BadRequest(message) => (
				StatusCode::BAD_REQUEST,
				json!({ "success": false, "error": message }),
			),
			ApiError::NotFound(message) => (
				StatusCode::NOT_FOUND,
				json!({ "success": false, "error": message }),
			),
		};
		(status, Json(body)).into_response()
	}
}

fn relay_error_body(error: &RelayError) -> (StatusCode, serde_json::Value) {
	let message = error.to_string();
	match error {
		RelayError::InvalidSignature(_) | RelayError::Build(_) => (
			StatusCode::BAD_REQUEST,
			json!({ "success": false, "error": message }),
		),
		RelayError::ReplayRejected(ReplayError::Rejected {
			expected,
			actual,
			pending,
			..
		}) => (
			StatusCode::CONFLICT,
			json!({
				"success": false,
				"error": message,
				"expected_nonce": expected,
				"actual_nonce": actual,
				"pending_nonce": pending,
			}),
		),
		RelayError::ReplayRejected(_) => (
			StatusCode::INTERNAL_SERVER_ERROR,
			json!({ "success": false, "error": message }),
		),
		RelayError::Submission(_) => (
			StatusCode::BAD_GATEWAY,
			json!({ "success": false, "error": message }),
		),
	}
}

#[derive(Debug, Serialize)]
struct RelayResponse {
	success: bool,
	status: &'static str,
	tx_hash: TxHash,
	receipt: RelayReceipt,
}

impl From<RelayOutcome> for RelayResponse {
	fn from(outcome: RelayOutcome) -> Self {
		Self {
			success: matches!(outcome, RelayOutcome::Confirmed(_)),
			status: outcome.label(),
			tx_hash: outcome.tx_hash(),
			receipt: outcome.receipt().clone(),
		}
	}
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/api/v1/relay", post(relay))
		.route("/api/v1/receipts/{tx_hash}", get(receipt))
		.route("/api/v1/nonces/{address}", get(nonce))
		.with_state(state)
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive())
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
	let info = state.engine.info();
	Json(json!({
		"status": "ok",
		"relay": info.name,
		"operator": info.operator,
		"chain_id": info.chain_id,
		"forwarder": info.forwarder,
	}))
}

async fn relay(
	State(state): State<AppState>,
	Json(request): Json<SignedForwardRequest>,
) -> Result<Json<RelayResponse>, ApiError> {
	let outcome = state.engine.relay(request).await?;
	Ok(Json(outcome.into()))
}

async fn receipt(
	State(state): State<AppState>,
	Path(tx_hash): Path<String>,
) -> Result<Json<RelayReceipt>, ApiError> {
	let hash: TxHash = tx_hash
		.parse()
		.map_err(|_| ApiError::BadRequest(format!("Invalid transaction hash: {}", tx_hash)))?;

	state
		.engine
		.poll_receipt(hash)
		.await
		.map(Json)
		.ok_or_else(|| ApiError::NotFound(format!("Unknown transaction {}", hash)))
}

async fn nonce(
	State(state): State<AppState>,
	Path(address): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let user: Address = address
		.parse()
		.map_err(|_| ApiError::BadRequest(format!("Invalid address: {}", address)))?;

	Ok(Json(json!({
		"address": user,
		"nonce": state.engine.next_nonce(&user),
	})))
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::signers::{local::PrivateKeySigner, SignerSync};
	use axum::body::{to_bytes, Body};
	use axum::http::Request;
	use relay_config::{ConfigFormat, ConfigLoader};
	use relay_core::RelayBuilder;
	use relay_delivery::implementations::mock::MockNetwork;
	use relay_types::{Bytes, ForwardRequest};
	use relay_verifier::signing_digest;
	use tower::ServiceExt;

	const CONFIG: &str = r#"
[relay]
name = "api-test"

[network]
rpc_url = "http://127.0.0.1:8545"
chain_id = 31337

[forwarder]
address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"

[account]
private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"

[confirmation]
timeout_seconds = 5
poll_interval_ms = 10
"#;

	async fn app(network: Arc<MockNetwork>) -> (Router, Arc<RelayEngine>) {
		let config = ConfigLoader::new()
			.parse(CONFIG, ConfigFormat::Toml)
			.unwrap();
		let engine = Arc::new(
			RelayBuilder::new(config)
				.with_network(network)
				.build()
				.await
				.unwrap(),
		);
		let router = router(AppState {
			engine: engine.clone(),
		});
		(router, engine)
	}

	fn signed_request(engine: &RelayEngine, user: &PrivateKeySigner, nonce: u64) -> SignedForwardRequest {
		let request = ForwardRequest {
			user: user.address(),
			target: Address::repeat_byte(0x7a),
			data: Bytes::from_static(&[0xab, 0xcd]),
			gas_limit: Some(90_000),
			nonce,
		};
		let digest = signing_digest(&request, engine.verifier().domain());
		let signature = user.sign_hash_sync(&digest).unwrap();
		SignedForwardRequest::new(request, signature.as_bytes().to_vec())
	}

	async fn send(router: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
		let response = router.clone().oneshot(request).await.unwrap();
		let status = response.status();
		let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		(status, serde_json::from_slice(&body).unwrap())
	}

	fn post_relay(signed: &SignedForwardRequest) -> Request<Body> {
		Request::builder()
			.method("POST")
			.uri("/api/v1/relay")
			.header("content-type", "application/json")
			.body(Body::from(serde_json::to_vec(signed).unwrap()))
			.unwrap()
	}

	fn get(uri: &str) -> Request<Body> {
		Request::builder().uri(uri).body(Body::empty()).unwrap()
	}

	#[tokio::test]
	async fn test_relay_then_replay() {
		let (router, engine) = app(Arc::new(MockNetwork::new(31337))).await;
		let user = PrivateKeySigner::random();
		let signed = signed_request(&engine, &user, 0);

		let (status, body) = send(&router, post_relay(&signed)).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["status"], "confirmed");
		assert_eq!(body["receipt"]["status"], "confirmed");
		let tx_hash = body["tx_hash"].as_str().unwrap().to_string();

		let (status, body) = send(&router, post_relay(&signed)).await;
		assert_eq!(status, StatusCode::CONFLICT);
		assert_eq!(body["expected_nonce"], 1);
		assert_eq!(body["actual_nonce"], 0);

		let (status, body) = send(&router, get(&format!("/api/v1/receipts/{}", tx_hash))).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["block_number"], 1);

		let (status, body) = send(&router, get(&format!("/api/v1/nonces/{}", user.address()))).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["nonce"], 1);
	}

	#[tokio::test]
	async fn test_bad_signature_is_bad_request() {
		let (router, engine) = app(Arc::new(MockNetwork::new(31337))).await;
		let user = PrivateKeySigner::random();
		let mut signed = signed_request(&engine, &user, 0);
		signed.request.gas_limit = Some(90_001);

		let (status, body) = send(&router, post_relay(&signed)).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["success"], false);
	}

	#[tokio::test]
	async fn test_broadcast_failure_is_bad_gateway() {
		let network = Arc::new(MockNetwork::new(31337));
		network.fail_next_sends(1).await;
		let (router, engine) = app(network).await;
		let user = PrivateKeySigner::random();

		let (status, _) = send(&router, post_relay(&signed_request(&engine, &user, 0))).await;
		assert_eq!(status, StatusCode::BAD_GATEWAY);
		assert_eq!(engine.next_nonce(&user.address()), 0);
	}

	#[tokio::test]
	async fn test_receipt_lookup_errors() {
		let (router, _) = app(Arc::new(MockNetwork::new(31337))).await;

		let (status, _) = send(&router, get("/api/v1/receipts/0x1234")).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);

		let unknown = format!("/api/v1/receipts/{}", TxHash::repeat_byte(3));
		let (status, _) = send(&router, get(&unknown)).await;
		assert_eq!(status, StatusCode::NOT_FOUND);

		let (status, _) = send(&router, get("/api/v1/nonces/not-an-address")).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
	}

	#[tokio::test]
	async fn test_health() {
		let (router, engine) = app(Arc::new(MockNetwork::new(31337))).await;

		let (status, body) = send(&router, get("/health")).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["relay"], "api-test");
		assert_eq!(body["chain_id"], 31337);
		assert_eq!(
			body["operator"].as_str().unwrap().parse::<Address>().unwrap(),
			engine.info().operator
		);
	}
}
