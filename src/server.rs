//! HTTP surface over the rate store and the update coordinator.

use crate::core::error::StoreError;
use crate::core::rate::StoredRate;
use crate::core::store::RateStore;
use crate::update::{CycleReport, Trigger, UpdateCoordinator};
use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RateStore>,
    pub coordinator: Arc<UpdateCoordinator>,
    pub default_currency: String,
}

#[derive(Debug, Deserialize)]
pub struct RatesQuery {
    currency: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    Store(StoreError),
    Task(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Store(err @ StoreError::NotFound { .. }) => {
                (StatusCode::NOT_FOUND, err.to_string())
            }
            ApiError::Store(err) => {
                error!("Rate store request failed: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::Task(message) => {
                error!("Update task failed: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/getRates", get(get_rates))
        .route("/getRatesFromDB", get(get_all_rates))
        .route("/performRateUpdate", get(perform_update).post(perform_update))
        .layer(cors)
        .with_state(state)
}

async fn get_rates(
    State(state): State<AppState>,
    Query(query): Query<RatesQuery>,
) -> Result<Json<StoredRate>, ApiError> {
    let code = query
        .currency
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| state.default_currency.clone())
        .trim()
        .to_uppercase();
    Ok(Json(state.store.latest(&code).await?))
}

async fn get_all_rates(State(state): State<AppState>) -> Result<Json<Vec<StoredRate>>, ApiError> {
    Ok(Json(state.store.all().await?))
}

async fn perform_update(State(state): State<AppState>) -> Result<Json<CycleReport>, ApiError> {
    let coordinator = Arc::clone(&state.coordinator);
    let report = tokio::spawn(async move { coordinator.run_cycle(Trigger::Manual).await })
        .await
        .map_err(|e| ApiError::Task(e.to_string()))?;
    Ok(Json(report))
}

/// Binds `bind` and serves until Ctrl-C.
pub async fn serve(bind: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::FetchError;
    use crate::core::rate::{CurrencyObservation, RatePair, SymbolTable};
    use crate::core::source::DocumentSource;
    use crate::extract::pdf::test_support::{build_pdf, page};
    use crate::extract::rates::MalformedPolicy;
    use crate::providers::document::FetchOutcome;
    use crate::store::memory::MemoryRateStore;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use chrono::Local;
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct SheetSource {
        dir: TempDir,
        body: Vec<u8>,
    }

    #[async_trait]
    impl DocumentSource for SheetSource {
        async fn fetch(&self, _updated_today: bool) -> Result<FetchOutcome, FetchError> {
            let path = self.dir.path().join("rates.pdf");
            tokio::fs::write(&path, &self.body).await.unwrap();
            Ok(FetchOutcome {
                path,
                last_modified: None,
                is_new_for_today: false,
                bytes_written: self.body.len(),
            })
        }
    }

    fn state(store: Arc<MemoryRateStore>) -> AppState {
        let source = Arc::new(SheetSource {
            dir: tempfile::tempdir().unwrap(),
            body: build_pdf(vec![page(&[
                (40, 700, "United States Dollars 12.10 12.95"),
                (40, 680, "Euro 13.05 13.90"),
            ])]),
        });
        let symbols: SymbolTable = [("United States Dollars", "USD"), ("Euro", "EUR")]
            .into_iter()
            .collect();
        let coordinator = Arc::new(UpdateCoordinator::new(
            source,
            store.clone(),
            symbols,
            MalformedPolicy::Skip,
        ));
        AppState {
            store,
            coordinator,
            default_currency: "USD".to_string(),
        }
    }

    #[tokio::test]
    async fn test_get_rates_normalizes_default_currency() {
        let store = Arc::new(MemoryRateStore::new());
        store.insert(observation("EUR", 13.0, 13.8)).await.unwrap();
        let app = router(AppState {
            default_currency: " eur ".to_string(),
            ..state(store)
        });

        let (status, body) = call(app, "GET", "/getRates?currency=").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["currency"], "EUR");
    }

    fn observation(code: &str, buying: f64, selling: f64) -> CurrencyObservation {
        CurrencyObservation {
            label: code.to_string(),
            code: code.to_string(),
            rate: RatePair::new(buying, selling),
            observed_at: Local::now(),
        }
    }

    async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_get_rates_returns_latest_row() {
        let store = Arc::new(MemoryRateStore::new());
        store.insert(observation("USD", 12.0, 12.8)).await.unwrap();
        store.insert(observation("EUR", 13.0, 13.8)).await.unwrap();
        store.insert(observation("USD", 12.1, 12.9)).await.unwrap();
        let app = router(state(store));

        let (status, body) = call(app.clone(), "GET", "/getRates?currency=usd").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], 3);
        assert_eq!(body["currency"], "USD");
        assert_eq!(body["buying"], 12.1);
        assert_eq!(body["selling"], 12.9);

        let (status, body) = call(app, "GET", "/getRates").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["currency"], "USD");
    }

    #[tokio::test]
    async fn test_get_rates_unknown_currency_is_404() {
        let app = router(state(Arc::new(MemoryRateStore::new())));

        let (status, body) = call(app, "GET", "/getRates?currency=JPY").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("JPY"));
    }

    #[tokio::test]
    async fn test_get_rates_from_db_lists_all_rows() {
        let store = Arc::new(MemoryRateStore::new());
        store.insert(observation("USD", 12.0, 12.8)).await.unwrap();
        store.insert(observation("EUR", 13.0, 13.8)).await.unwrap();
        let app = router(state(store));

        let (status, body) = call(app, "GET", "/getRatesFromDB").await;
        assert_eq!(status, StatusCode::OK);
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["currency"], "USD");
        assert_eq!(rows[1]["currency"], "EUR");
    }

    #[tokio::test]
    async fn test_perform_rate_update_runs_manual_cycle() {
        let store = Arc::new(MemoryRateStore::new());
        let app = router(state(store.clone()));

        let (status, body) = call(app.clone(), "POST", "/performRateUpdate").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["trigger"], "manual");
        assert_eq!(body["outcome"]["status"], "completed");
        assert_eq!(body["stored"], 2);

        // manual updates are not gated
        let (_, body) = call(app, "GET", "/performRateUpdate").await;
        assert_eq!(body["outcome"]["status"], "completed");
        assert_eq!(store.all().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let app = router(state(Arc::new(MemoryRateStore::new())));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/getRatesFromDB")
                    .header("origin", "http://dashboard.test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }
}
