//! Authenticated CRM client: retry/backoff and status classification.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::config::HubSpotConfig;
use crate::document::id_value;
use crate::domain::ObjectType;
use crate::errors::{CrmError, CrmResult, ErrorKind};
use crate::query::SearchRequest;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport, TransportError};

/// Bounded exponential backoff applied to transient failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, base_delay: Duration::from_secs(1) }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &HubSpotConfig) -> Self {
        Self { max_retries: config.max_retries, base_delay: config.retry_base_delay() }
    }

    /// Delay before retrying after zero-based `attempt`: `base * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Outcome of a single attempt before the retry decision.
enum Attempt {
    Done(CrmResult<Value>),
    Retry { reason: &'static str, error: CrmError },
}

pub struct HubSpotClient {
    transport: Arc<dyn HttpTransport>,
    retry: RetryPolicy,
}

impl HubSpotClient {
    pub fn new(transport: Arc<dyn HttpTransport>, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    pub fn from_config(config: &HubSpotConfig) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::from_config(config)?;
        Ok(Self::new(Arc::new(transport), RetryPolicy::from_config(config)))
    }

    /// Sends `request`, retrying 429, 5xx and network failures per the policy.
    pub async fn request(&self, request: ApiRequest) -> CrmResult<Value> {
        let mut attempt = 0;
        loop {
            let outcome = match self.transport.send(&request).await {
                Ok(response) => classify(response),
                Err(error) => Attempt::Retry {
                    reason: "network_error",
                    error: CrmError::new(ErrorKind::NetworkError, format!("Network error: {error}")),
                },
            };

            match outcome {
                Attempt::Done(result) => {
                    if result.is_ok() {
                        info!(
                            event_name = "crm.request.completed",
                            method = %request.method,
                            path = %request.path,
                            attempts = attempt + 1,
                            "crm request completed"
                        );
                    }
                    return result;
                }
                Attempt::Retry { reason, error } if attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    attempt += 1;
                    warn!(
                        event_name = "crm.request.retry",
                        method = %request.method,
                        path = %request.path,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        reason,
                        error = %error,
                        "retrying crm request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Attempt::Retry { error, .. } => {
                    warn!(
                        event_name = "crm.request.exhausted",
                        method = %request.method,
                        path = %request.path,
                        attempts = attempt + 1,
                        error = %error,
                        "crm request failed after retries"
                    );
                    return Err(error);
                }
            }
        }
    }

    pub async fn get_object<S: AsRef<str>>(
        &self,
        object_type: ObjectType,
        id: &str,
        properties: &[S],
    ) -> CrmResult<Value> {
        self.request(ApiRequest::get(object_type.record_path(id)).properties(properties)).await
    }

    pub async fn create_object(&self, object_type: ObjectType, body: Value) -> CrmResult<Value> {
        self.request(ApiRequest::post(object_type.object_path(), body)).await
    }

    pub async fn update_object(
        &self,
        object_type: ObjectType,
        id: &str,
        properties: Map<String, Value>,
    ) -> CrmResult<Value> {
        let body = json!({ "properties": properties });
        self.request(ApiRequest::patch(object_type.record_path(id), body)).await
    }

    pub async fn search(&self, object_type: ObjectType, search: &SearchRequest) -> CrmResult<Value> {
        self.request(ApiRequest::post(object_type.search_path(), search.to_json())).await
    }

    /// One batch read call; callers chunk to the API maximum.
    pub async fn batch_read(
        &self,
        object_type: ObjectType,
        ids: &[String],
        properties: &[&str],
    ) -> CrmResult<Value> {
        let inputs: Vec<Value> = ids.iter().map(|id| json!({ "id": id })).collect();
        let body = json!({ "inputs": inputs, "properties": properties });
        self.request(ApiRequest::post(object_type.batch_read_path(), body)).await
    }

    /// Raw v4 association listing for one record.
    pub async fn list_associations(
        &self,
        from: ObjectType,
        id: &str,
        to: ObjectType,
        limit: Option<u32>,
    ) -> CrmResult<Value> {
        let mut request = ApiRequest::get(from.associations_path(id, to));
        if let Some(limit) = limit {
            request = request.query_param("limit", limit);
        }
        self.request(request).await
    }
}

/// `toObjectId`s of a v4 association listing, normalized to strings.
pub fn association_target_ids(listing: &Value) -> Vec<String> {
    crate::document::results(listing)
        .iter()
        .filter_map(|link| link.get("toObjectId").and_then(id_value))
        .collect()
}

fn classify(response: ApiResponse) -> Attempt {
    let status = response.status;
    match status {
        200..=299 => Attempt::Done(parse_success(&response.body)),
        429 => Attempt::Retry {
            reason: "rate_limited",
            error: CrmError::new(ErrorKind::RateLimit, "Rate limit exceeded after retries")
                .with_status(status),
        },
        500..=u16::MAX => Attempt::Retry {
            reason: "server_error",
            error: CrmError::new(ErrorKind::ServerError, "HubSpot API server error")
                .with_status(status),
        },
        401 => Attempt::Done(Err(CrmError::new(
            ErrorKind::Authentication,
            "Invalid or expired access token",
        )
        .with_status(status))),
        403 => Attempt::Done(Err(CrmError::new(
            ErrorKind::Authentication,
            "Insufficient permissions for this operation",
        )
        .with_status(status))),
        404 => Attempt::Done(Err(
            CrmError::new(ErrorKind::NotFound, "Resource not found").with_status(status)
        )),
        _ => Attempt::Done(Err(CrmError::validation(remote_message(&response.body, status))
            .with_status(status))),
    }
}

fn parse_success(body: &str) -> CrmResult<Value> {
    if body.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(body).map_err(|error| {
        CrmError::new(ErrorKind::Unknown, format!("Invalid JSON in response body: {error}"))
    })
}

fn remote_message(body: &str, status: u16) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| format!("HTTP {status}"))
}
