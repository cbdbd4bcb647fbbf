//! API Server
//!
//! Wires the route handlers to shared state and runs the axum server.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api::routes::{handle_api, handle_health};
use crate::config::{ExchangeConfig, SuspendSwitch};
use crate::reconciler::ReconcilerHandle;
use crate::registry::AccountRegistry;
use crate::storage::ExchangeStore;

/// Combined application state
pub struct AppState {
    pub config: Arc<ExchangeConfig>,
    pub store: Arc<dyn ExchangeStore>,
    pub registry: Arc<AccountRegistry>,
    pub reconciler: ReconcilerHandle,
    pub suspend: SuspendSwitch,
}

/// Shared app state type
pub type SharedAppState = Arc<AppState>;

/// Create the exchange API router
pub fn create_router(state: SharedAppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api", post(handle_api))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve the API on the given port.
pub async fn start_server(state: SharedAppState, port: u16) -> Result<(), std::io::Error> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "api server listening");
    axum::serve(listener, router).await
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcoin::MockBitcoinRpc;
    use crate::ledger::MockNativeLedger;
    use crate::reconciler::{spawn_reconciler, Reconciler};
    use crate::storage::MemoryExchangeStore;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    fn test_state() -> SharedAppState {
        let store = Arc::new(MemoryExchangeStore::new());
        let config = Arc::new(ExchangeConfig::default());
        let suspend = SuspendSwitch::default();

        let mut bitcoin = MockBitcoinRpc::new();
        bitcoin
            .expect_get_new_address()
            .returning(|_| Ok("tb1qtest".to_string()));
        bitcoin.expect_lookup_transaction().returning(|_| Ok(None));
        let bitcoin: Arc<dyn crate::bitcoin::BitcoinRpc> = Arc::new(bitcoin);

        let mut ledger = MockNativeLedger::new();
        ledger.expect_current_height().returning(|| Ok(100));
        let ledger: Arc<dyn crate::ledger::NativeLedger> = Arc::new(ledger);

        let registry = Arc::new(AccountRegistry::new(store.clone(), bitcoin.clone()));
        let reconciler = Reconciler::new(
            store.clone(),
            bitcoin,
            ledger,
            config.clone(),
            suspend.clone(),
        );
        let (handle, _worker) = spawn_reconciler(reconciler);

        Arc::new(AppState {
            config,
            store,
            registry,
            reconciler: handle,
            suspend,
        })
    }

    fn api_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let router = create_router(test_state());
        let response = router
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_get_status_reports_config() {
        let router = create_router(test_state());
        let response = router
            .oneshot(api_request("function=getStatus"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["currencyCode"], "TOKX");
        assert_eq!(body["currencyDecimals"], 4);
        assert_eq!(body["exchangeRate"], "1000");
        assert_eq!(body["confirmations"], 3);
        assert_eq!(body["suspended"], false);
    }

    #[tokio::test]
    async fn test_missing_function_is_code_3() {
        let router = create_router(test_state());
        let response = router.oneshot(api_request("")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["errorCode"], 3);
    }

    #[tokio::test]
    async fn test_unknown_function_is_code_5() {
        let router = create_router(test_state());
        let response = router
            .oneshot(api_request("function=doEverything"))
            .await
            .unwrap();

        let body = json_body(response).await;
        assert_eq!(body["errorCode"], 5);
    }

    #[tokio::test]
    async fn test_malformed_account_is_code_4() {
        let router = create_router(test_state());
        let response = router
            .oneshot(api_request("function=getAddress&account=bob"))
            .await
            .unwrap();

        let body = json_body(response).await;
        assert_eq!(body["errorCode"], 4);
    }

    #[tokio::test]
    async fn test_suspend_and_resume() {
        let state = test_state();

        let response = create_router(state.clone())
            .oneshot(api_request("function=suspendSend"))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["suspended"], true);
        assert!(state.suspend.is_suspended());

        let response = create_router(state.clone())
            .oneshot(api_request("function=resumeSend"))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["suspended"], false);
        assert!(!state.suspend.is_suspended());
    }

    #[tokio::test]
    async fn test_get_address_allocates() {
        let router = create_router(test_state());
        let response = router
            .oneshot(api_request("function=getAddress&account=4200"))
            .await
            .unwrap();

        let body = json_body(response).await;
        assert_eq!(body["account"], "4200");
        assert_eq!(body["bitcoinAddress"], "tb1qtest");
    }

    #[tokio::test]
    async fn test_block_received_acknowledged() {
        let router = create_router(test_state());
        let response = router
            .oneshot(api_request("function=blockReceived&id=blk1"))
            .await
            .unwrap();

        let body = json_body(response).await;
        assert_eq!(body["processed"], true);
    }

    #[tokio::test]
    async fn test_get_tokens_renders_amounts() {
        let state = test_state();
        let token = crate::types::Token::mint_leg(
            "dep1",
            1001,
            50,
            15_000_000,
            150_000_000,
            "tb1qdeposit".to_string(),
        );
        state.store.store_token(&token).await.unwrap();

        let response = create_router(state)
            .oneshot(api_request("function=getTokens"))
            .await
            .unwrap();

        let body = json_body(response).await;
        let tokens = body["tokens"].as_array().unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0]["id"], "dep1");
        assert_eq!(tokens[0]["side"], "mint");
        assert_eq!(tokens[0]["tokenAmount"], "1500.0000");
        assert_eq!(tokens[0]["bitcoinAmount"], "1.50000000");
    }
}
