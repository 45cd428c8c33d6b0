use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, Result};

/// Outbound client for the offer provider.
///
/// Any recoverable [`FetchFailure`] is logged and replaced with
/// [`fallback_offers`], so ingestion always has input. Only a missing
/// credential reaches the caller, as `AppError::ProviderUnavailable`.
pub struct ProviderGateway {
    client: reqwest::Client,
    base_url: String,
    source: String,
    token: Option<String>,
}

/// Fetch failures that fall back to the canned dataset.
#[derive(Debug, Error)]
pub enum FetchFailure {
    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(reqwest::Error),

    #[error("provider returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed response body: {0}")]
    Malformed(String),
}

impl FetchFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchFailure::Timeout => "timeout",
            FetchFailure::Transport(_) => "transport",
            FetchFailure::Status(_) => "status",
            FetchFailure::Malformed(_) => "malformed",
        }
    }
}

impl From<reqwest::Error> for FetchFailure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchFailure::Timeout
        } else {
            FetchFailure::Transport(e)
        }
    }
}

impl ProviderGateway {
    pub fn new(cfg: &Config) -> Result<Self> {
        Self::with_settings(
            cfg.provider_base_url.clone(),
            cfg.provider_source.clone(),
            cfg.provider_token.clone(),
            Duration::from_secs(cfg.provider_timeout_secs),
        )
    }

    pub fn with_settings(
        base_url: String,
        source: String,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            source,
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    /// Current offer records from the provider, or the fallback dataset.
    pub async fn fetch(&self) -> Result<Vec<Value>> {
        let Some(token) = self.token.as_deref() else {
            return Err(AppError::ProviderUnavailable(
                "PROVIDER_TOKEN is not configured".to_string(),
            ));
        };

        match self.request(token).await {
            Ok(records) => {
                info!(records = records.len(), source = %self.source, "Fetched provider offers");
                Ok(records)
            }
            Err(failure) => {
                warn!(
                    kind = failure.kind(),
                    "Falling back to sample provider data due to error: {failure}"
                );
                Ok(fallback_offers())
            }
        }
    }

    async fn request(&self, token: &str) -> std::result::Result<Vec<Value>, FetchFailure> {
        let payload = json!({ "source": self.source, "token": token });
        let resp = self.client.post(&self.base_url).json(&payload).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchFailure::Status(status));
        }

        let body = resp.bytes().await?;
        let value: Value =
            serde_json::from_slice(&body).map_err(|e| FetchFailure::Malformed(e.to_string()))?;
        match value {
            Value::Array(items) => Ok(items),
            other => Err(FetchFailure::Malformed(format!(
                "expected a JSON array, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Deterministic dataset used whenever the provider cannot be reached.
pub fn fallback_offers() -> Vec<Value> {
    vec![
        json!({
            "offer_id": "128541",
            "offer_name": "MOYU UK",
            "category": "Others",
            "geo": "UK",
            "payout_type": "Per Sale",
            "payout_value": "12%",
            "acceptance_rate": 42.85,
            "cookie_days": 30,
            "listing_date": "2025-02-25",
            "epc_current": 133.0,
            "epc_7d": 95.0,
            "epc_30d": 74.0
        }),
        json!({
            "offer_id": "839441",
            "offer_name": "Zenify Sleep Gummies",
            "category": "Health & Beauty",
            "geo": "US",
            "payout_type": "Per Sale",
            "payout_value": "$28.00",
            "acceptance_rate": 55.1,
            "cookie_days": 45,
            "listing_date": "2024-11-16",
            "epc_current": 87.5,
            "epc_7d": 61.2,
            "epc_30d": 38.4
        }),
        json!({
            "offer_id": "992114",
            "offer_name": "FitWave Pro Trainer",
            "category": "Sports & Outdoors",
            "geo": "CA",
            "payout_type": "Per Lead",
            "payout_value": "$19.00",
            "acceptance_rate": 38.2,
            "cookie_days": 20,
            "listing_date": "2024-09-09",
            "epc_current": 41.3,
            "epc_7d": 25.7,
            "epc_30d": 19.4
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/monetization")
    }

    fn gateway(url: String, token: Option<&str>, timeout_ms: u64) -> ProviderGateway {
        ProviderGateway::with_settings(
            url,
            "partnermatic".to_string(),
            token.map(str::to_string),
            Duration::from_millis(timeout_ms),
        )
        .unwrap()
    }

    fn fallback_ids(records: &[Value]) -> Vec<&str> {
        records.iter().filter_map(|r| r["offer_id"].as_str()).collect()
    }

    #[tokio::test]
    async fn missing_token_is_surfaced() {
        let gw = gateway("http://127.0.0.1:9/".to_string(), None, 500);
        assert!(matches!(gw.fetch().await, Err(AppError::ProviderUnavailable(_))));

        let blank = gateway("http://127.0.0.1:9/".to_string(), Some("  "), 500);
        assert!(matches!(blank.fetch().await, Err(AppError::ProviderUnavailable(_))));
    }

    #[tokio::test]
    async fn successful_fetch_sends_source_and_token() {
        let app = Router::new().route(
            "/monetization",
            post(|Json(body): Json<Value>| async move {
                Json(json!([{ "offer_id": "1", "source": body["source"], "token": body["token"] }]))
            }),
        );
        let gw = gateway(serve(app).await, Some("secret"), 2_000);

        let records = gw.fetch().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["source"], "partnermatic");
        assert_eq!(records[0]["token"], "secret");
    }

    #[tokio::test]
    async fn server_error_falls_back() {
        let app = Router::new().route(
            "/monetization",
            post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
        let records = gateway(serve(app).await, Some("t"), 2_000).fetch().await.unwrap();
        assert_eq!(fallback_ids(&records), vec!["128541", "839441", "992114"]);
    }

    #[tokio::test]
    async fn non_array_body_falls_back() {
        let app = Router::new().route(
            "/monetization",
            post(|| async { Json(json!({ "offers": [] })) }),
        );
        let records = gateway(serve(app).await, Some("t"), 2_000).fetch().await.unwrap();
        assert_eq!(records, fallback_offers());
    }

    #[tokio::test]
    async fn invalid_json_falls_back() {
        let app = Router::new().route("/monetization", post(|| async { "<html>oops</html>" }));
        let records = gateway(serve(app).await, Some("t"), 2_000).fetch().await.unwrap();
        assert_eq!(records, fallback_offers());
    }

    #[tokio::test]
    async fn timeout_falls_back() {
        let app = Router::new().route(
            "/monetization",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!([]))
            }),
        );
        let records = gateway(serve(app).await, Some("t"), 200).fetch().await.unwrap();
        assert_eq!(records, fallback_offers());
    }

    #[tokio::test]
    async fn unreachable_provider_falls_back() {
        let records = gateway("http://127.0.0.1:9/".to_string(), Some("t"), 500)
            .fetch()
            .await
            .unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn fallback_dataset_is_deterministic() {
        assert_eq!(fallback_offers(), fallback_offers());
        assert_eq!(fallback_ids(&fallback_offers()), vec!["128541", "839441", "992114"]);
    }
}
