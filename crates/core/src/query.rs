//! Filter and sort grammar of the CRM search API.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::document::{property, property_or_empty};
use crate::domain::task::{PROP_OWNER, PROP_STATUS, PROP_TIMESTAMP, TASK_PROPERTIES};
use crate::errors::{CrmError, CrmResult};
use crate::time::{iso_to_millis, parse_timestamp_ms};

/// Hard maximum of the search API's `limit`.
pub const SEARCH_LIMIT_MAX: u32 = 100;

/// Record id pseudo-property accepted by the search API.
pub const PROP_OBJECT_ID: &str = "hs_object_id";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOperator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    ContainsToken,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub property_name: String,
    pub operator: FilterOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}

impl Filter {
    pub fn new(property_name: impl Into<String>, operator: FilterOperator, value: impl Into<String>) -> Self {
        Self { property_name: property_name.into(), operator, value: Some(value.into()), values: None }
    }

    pub fn eq(property_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(property_name, FilterOperator::Eq, value)
    }

    pub fn one_of<I, S>(property_name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            property_name: property_name.into(),
            operator: FilterOperator::In,
            value: None,
            values: Some(values.into_iter().map(Into::into).collect()),
        }
    }

    /// Client-side evaluation, used when a record did not come from the search API.
    ///
    /// Only equality-style operators can be checked locally; the rest pass.
    pub fn matches(&self, record: &Value) -> bool {
        let actual = property(record, &self.property_name);
        match self.operator {
            FilterOperator::Eq => actual == self.value.as_deref(),
            FilterOperator::Neq => actual != self.value.as_deref(),
            FilterOperator::In => match (actual, &self.values) {
                (Some(actual), Some(values)) => values.iter().any(|value| value == actual),
                _ => false,
            },
            _ => true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterGroup {
    pub filters: Vec<Filter>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ascending => "ASCENDING",
            Self::Descending => "DESCENDING",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortDirection {
    type Err = CrmError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ASCENDING" | "ASC" => Ok(Self::Ascending),
            "DESCENDING" | "DESC" => Ok(Self::Descending),
            other => Err(CrmError::validation(format!(
                "unsupported sort direction `{other}` (expected ASCENDING|DESCENDING)"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sort {
    pub property_name: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(property_name: impl Into<String>, direction: SortDirection) -> Self {
        Self { property_name: property_name.into(), direction }
    }

    /// Stable client-side sort on a timestamp property; absent or
    /// unparseable values sort as 0.
    pub fn apply(&self, records: &mut [Value]) {
        let key = |record: &Value| {
            parse_timestamp_ms(property_or_empty(record, &self.property_name)).unwrap_or(0)
        };
        match self.direction {
            SortDirection::Ascending => records.sort_by_key(key),
            SortDirection::Descending => records.sort_by(|left, right| key(right).cmp(&key(left))),
        }
    }
}

/// Body of `POST /crm/v3/objects/{type}/search`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub filter_groups: Vec<FilterGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub properties: Vec<String>,
    pub sorts: Vec<Sort>,
    pub limit: u32,
}

impl SearchRequest {
    pub fn new(properties: &[&str]) -> Self {
        Self {
            filter_groups: Vec::new(),
            query: None,
            properties: properties.iter().map(|name| name.to_string()).collect(),
            sorts: Vec::new(),
            limit: SEARCH_LIMIT_MAX,
        }
    }

    /// Adds a filter to the single AND-ed filter group.
    pub fn filter(mut self, filter: Filter) -> Self {
        match self.filter_groups.first_mut() {
            Some(group) => group.filters.push(filter),
            None => self.filter_groups.push(FilterGroup { filters: vec![filter] }),
        }
        self
    }

    pub fn filters(self, filters: impl IntoIterator<Item = Filter>) -> Self {
        filters.into_iter().fold(self, Self::filter)
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn sort(mut self, property_name: impl Into<String>, direction: SortDirection) -> Self {
        self.sorts = vec![Sort::new(property_name, direction)];
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Clamps a caller limit to the search API maximum; logs when it had to.
pub fn clamp_limit(requested: u32) -> u32 {
    if requested > SEARCH_LIMIT_MAX {
        warn!(
            event_name = "crm.query.limit_clamped",
            requested_limit = requested,
            effective_limit = SEARCH_LIMIT_MAX,
            "limit capped at search API maximum"
        );
        return SEARCH_LIMIT_MAX;
    }
    requested
}

/// High-level task filter intents.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskQuery {
    pub owner_id: Option<String>,
    pub status: Option<String>,
    pub due_date_start: Option<String>,
    pub due_date_end: Option<String>,
    pub limit: u32,
}

impl TaskQuery {
    /// Translates the intents into a search body; bad dates fail before any call.
    pub fn to_search_request(&self) -> CrmResult<SearchRequest> {
        let mut request = SearchRequest::new(TASK_PROPERTIES)
            .sort(PROP_TIMESTAMP, SortDirection::Ascending)
            .limit(clamp_limit(self.limit));

        if let Some(owner_id) = non_empty(&self.owner_id) {
            request = request.filter(Filter::eq(PROP_OWNER, owner_id));
        }
        if let Some(status) = non_empty(&self.status) {
            request = request.filter(Filter::eq(PROP_STATUS, status));
        }
        if let Some(start) = non_empty(&self.due_date_start) {
            let start_ms = iso_to_millis(start)?;
            request = request.filter(Filter::new(
                PROP_TIMESTAMP,
                FilterOperator::Gte,
                start_ms.to_string(),
            ));
        }
        if let Some(end) = non_empty(&self.due_date_end) {
            let end_ms = iso_to_millis(end)?;
            request =
                request.filter(Filter::new(PROP_TIMESTAMP, FilterOperator::Lte, end_ms.to_string()));
        }

        Ok(request)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn owner_and_start_date_produce_eq_and_gte_filters() {
        let query = TaskQuery {
            owner_id: Some("42".to_string()),
            due_date_start: Some("2025-01-01T00:00:00Z".to_string()),
            limit: 100,
            ..TaskQuery::default()
        };

        let body = query.to_search_request().expect("valid query").to_json();

        assert_eq!(
            body["filterGroups"],
            json!([{
                "filters": [
                    {"propertyName": "hubspot_owner_id", "operator": "EQ", "value": "42"},
                    {"propertyName": "hs_timestamp", "operator": "GTE", "value": "1735689600000"},
                ]
            }])
        );
        assert_eq!(body["sorts"], json!([{"propertyName": "hs_timestamp", "direction": "ASCENDING"}]));
        assert_eq!(body["limit"], 100);
        assert!(body.get("query").is_none());
    }

    #[test]
    fn no_intents_means_empty_filter_groups() {
        let body = TaskQuery { limit: 10, ..TaskQuery::default() }
            .to_search_request()
            .expect("valid query")
            .to_json();

        assert_eq!(body["filterGroups"], json!([]));
    }

    #[test]
    fn unparseable_end_date_is_a_validation_error() {
        let query = TaskQuery {
            due_date_end: Some("end of the month".to_string()),
            limit: 10,
            ..TaskQuery::default()
        };

        let error = query.to_search_request().unwrap_err();
        assert_eq!(error.kind, ErrorKind::Validation);
    }

    #[test]
    fn limit_above_max_is_clamped() {
        assert_eq!(clamp_limit(500), 100);
        assert_eq!(clamp_limit(100), 100);
        assert_eq!(clamp_limit(7), 7);

        let request =
            TaskQuery { limit: 500, ..TaskQuery::default() }.to_search_request().expect("valid");
        assert_eq!(request.limit, 100);
    }

    #[test]
    fn in_filter_serializes_values_not_value() {
        let json = serde_json::to_value(Filter::one_of(PROP_OBJECT_ID, ["1", "2"])).expect("json");

        assert_eq!(json, json!({"propertyName": "hs_object_id", "operator": "IN", "values": ["1", "2"]}));
    }

    #[test]
    fn local_matching_covers_eq_neq_and_in() {
        let record = json!({"properties": {"hs_meeting_outcome": "COMPLETED"}});

        assert!(Filter::eq("hs_meeting_outcome", "COMPLETED").matches(&record));
        assert!(!Filter::eq("hs_meeting_outcome", "SCHEDULED").matches(&record));
        assert!(Filter::new("hs_meeting_outcome", FilterOperator::Neq, "SCHEDULED").matches(&record));
        assert!(Filter::one_of("hs_meeting_outcome", ["SCHEDULED", "COMPLETED"]).matches(&record));
        assert!(!Filter::eq("missing", "x").matches(&record));
    }

    #[test]
    fn client_sort_orders_by_timestamp_property() {
        let mut notes = vec![
            json!({"id": "old", "properties": {"hs_timestamp": "2024-01-01T00:00:00Z"}}),
            json!({"id": "new", "properties": {"hs_timestamp": "1735689600000"}}),
            json!({"id": "none", "properties": {}}),
        ];

        Sort::new("hs_timestamp", SortDirection::Descending).apply(&mut notes);

        let ids: Vec<&str> = notes.iter().filter_map(|note| note["id"].as_str()).collect();
        assert_eq!(ids, vec!["new", "old", "none"]);
    }

    #[test]
    fn sort_direction_parses_leniently_and_defaults_descending() {
        assert_eq!("ascending".parse::<SortDirection>(), Ok(SortDirection::Ascending));
        assert_eq!(" DESC ".parse::<SortDirection>(), Ok(SortDirection::Descending));
        assert_eq!(SortDirection::default(), SortDirection::Descending);
        assert!("sideways".parse::<SortDirection>().is_err());
    }
}
