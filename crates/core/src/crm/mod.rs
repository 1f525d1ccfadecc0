//! Named CRM operations, one file per record family.

mod lookup;
mod meetings;
mod notes;
mod tasks;

use std::sync::Arc;

use serde_json::Value;

use crate::associations::AssociationResolver;
use crate::client::HubSpotClient;
use crate::config::{HubSpotConfig, DEFAULT_MEETING_TYPE};
use crate::document::set_field;
use crate::time::{Clock, SystemClock};
use crate::transport::TransportError;

pub use meetings::{DealMeetingsQuery, NewMeeting};
pub use tasks::{NewTask, TaskCompletion, TaskSearch, TaskUpdate, TasksForContact, TasksForDeal};

/// Entry point for every tool-facing operation.
///
/// Holds no per-call state; clone the `Arc`s to share it across handlers.
pub struct HubSpotService {
    client: Arc<HubSpotClient>,
    resolver: AssociationResolver,
    clock: Arc<dyn Clock>,
    meeting_types: Vec<String>,
}

impl HubSpotService {
    pub fn new(client: Arc<HubSpotClient>, clock: Arc<dyn Clock>) -> Self {
        Self {
            resolver: AssociationResolver::new(Arc::clone(&client)),
            client,
            clock,
            meeting_types: vec![DEFAULT_MEETING_TYPE.to_string()],
        }
    }

    pub fn from_config(config: &HubSpotConfig) -> Result<Self, TransportError> {
        let client = HubSpotClient::from_config(config)?;
        Ok(Self::new(Arc::new(client), Arc::new(SystemClock))
            .with_meeting_types(config.meeting_types.clone()))
    }

    /// Replaces the accepted meeting activity types; an empty list is ignored.
    pub fn with_meeting_types(mut self, meeting_types: Vec<String>) -> Self {
        if !meeting_types.is_empty() {
            self.meeting_types = meeting_types;
        }
        self
    }

    fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }
}

/// Replaces `results` and recomputes `total` on a response object.
fn replace_results(response: &mut Value, results: Vec<Value>) {
    set_field(response, "total", Value::from(results.len()));
    set_field(response, "results", Value::Array(results));
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
