use std::sync::{Arc, Mutex};
use std::time::Duration;

use hubbridge_core::{
    ApiRequest, ErrorKind, HttpMethod, HubSpotClient, RetryPolicy, ScriptedReply, ScriptedTransport,
};
use serde_json::json;
use tokio::time::Instant;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

const PATH: &str = "/crm/v3/objects/tasks/1";

fn client(transport: &Arc<ScriptedTransport>) -> HubSpotClient {
    HubSpotClient::new(transport.clone(), RetryPolicy::default())
}

#[tokio::test(start_paused = true)]
async fn rate_limit_retries_three_times_with_doubling_delays() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.on_json(HttpMethod::Get, PATH, 429, json!({"message": "slow down"}));

    let started = Instant::now();
    let error = client(&transport).request(ApiRequest::get(PATH)).await.unwrap_err();

    assert_eq!(error.kind, ErrorKind::RateLimit);
    assert_eq!(error.message, "Rate limit exceeded after retries");
    assert_eq!(error.status, Some(429));
    assert_eq!(transport.call_count(), 4);
    assert_eq!(started.elapsed(), Duration::from_secs(1 + 2 + 4));
}

#[tokio::test(start_paused = true)]
async fn server_error_then_success_returns_the_body() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .on_json(HttpMethod::Get, PATH, 503, json!({}))
        .on_json(HttpMethod::Get, PATH, 200, json!({"id": "1"}));

    let started = Instant::now();
    let body = client(&transport).request(ApiRequest::get(PATH)).await.expect("retried to success");

    assert_eq!(body["id"], "1");
    assert_eq!(transport.call_count(), 2);
    assert_eq!(started.elapsed(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn exhausted_server_errors_keep_the_status() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.on_json(HttpMethod::Get, PATH, 502, json!({}));

    let error = client(&transport).request(ApiRequest::get(PATH)).await.unwrap_err();

    assert_eq!(error.kind, ErrorKind::ServerError);
    assert_eq!(error.message, "HubSpot API server error");
    assert_eq!(error.status, Some(502));
    assert_eq!(transport.call_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn network_failures_are_retried_then_reported() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.on(HttpMethod::Get, PATH, ScriptedReply::Network("connection reset".into()));

    let error = client(&transport).request(ApiRequest::get(PATH)).await.unwrap_err();

    assert_eq!(error.kind, ErrorKind::NetworkError);
    assert_eq!(error.message, "Network error: connection reset");
    assert_eq!(error.status, None);
    assert_eq!(transport.call_count(), 4);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let cases = [
        (401, json!({}), ErrorKind::Authentication, "Invalid or expired access token"),
        (403, json!({}), ErrorKind::Authentication, "Insufficient permissions for this operation"),
        (404, json!({}), ErrorKind::NotFound, "Resource not found"),
        (400, json!({"message": "Property values were not valid"}), ErrorKind::Validation, "Property values were not valid"),
        (422, json!({"status": "error"}), ErrorKind::Validation, "HTTP 422"),
    ];

    for (status, body, kind, message) in cases {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on_json(HttpMethod::Get, PATH, status, body);

        let error = client(&transport).request(ApiRequest::get(PATH)).await.unwrap_err();

        assert_eq!(error.kind, kind, "status {status}");
        assert_eq!(error.message, message, "status {status}");
        assert_eq!(error.status, Some(status));
        assert_eq!(transport.call_count(), 1, "status {status} must not retry");
    }
}

#[tokio::test]
async fn zero_retry_policy_makes_a_single_attempt() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.on_json(HttpMethod::Get, PATH, 429, json!({}));
    let client = HubSpotClient::new(
        transport.clone(),
        RetryPolicy { max_retries: 0, base_delay: Duration::from_secs(1) },
    );

    let error = client.request(ApiRequest::get(PATH)).await.unwrap_err();

    assert_eq!(error.kind, ErrorKind::RateLimit);
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn get_object_joins_requested_properties() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.on_json(HttpMethod::Get, PATH, 200, json!({"id": "1", "properties": {}}));

    client(&transport)
        .get_object(hubbridge_core::ObjectType::Task, "1", &["hs_task_subject", "hs_task_status"])
        .await
        .expect("task");

    let calls = transport.calls();
    assert_eq!(calls[0].query_value("properties"), Some("hs_task_subject,hs_task_status"));
}

/// Records `(level, event_name)` for every event.
#[derive(Clone, Default)]
struct EventLog(Arc<Mutex<Vec<(Level, String)>>>);

impl EventLog {
    fn contains(&self, level: Level, event_name: &str) -> bool {
        self.0.lock().expect("event log").iter().any(|(l, name)| *l == level && name == event_name)
    }
}

#[derive(Default)]
struct EventName(String);

impl Visit for EventName {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "event_name" {
            self.0 = value.to_string();
        }
    }

    fn record_debug(&mut self, _field: &Field, _value: &dyn std::fmt::Debug) {}
}

impl<S: Subscriber> Layer<S> for EventLog {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut name = EventName::default();
        event.record(&mut name);
        self.0.lock().expect("event log").push((*event.metadata().level(), name.0));
    }
}

#[tokio::test]
async fn successful_requests_log_completion_at_info() {
    let log = EventLog::default();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(log.clone()));

    let transport = Arc::new(ScriptedTransport::new());
    transport.on_json(HttpMethod::Get, PATH, 200, json!({"id": "1"}));

    client(&transport).request(ApiRequest::get(PATH)).await.expect("request");

    assert!(log.contains(Level::INFO, "crm.request.completed"));
}
