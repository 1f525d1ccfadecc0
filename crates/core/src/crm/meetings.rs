use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::notes::empty_for_deal;
use super::{non_empty, HubSpotService};
use crate::associations::HydrationRequest;
use crate::client::association_target_ids;
use crate::document::{record_id, results};
use crate::domain::meeting::{
    is_calendly_meeting, sort_by_start_time, MEETING_PROPERTIES, PROP_ACTIVITY_TYPE, PROP_BODY,
    PROP_END_TIME, PROP_INTERNAL_NOTES, PROP_LOCATION, PROP_OUTCOME, PROP_START_TIME, PROP_TITLE,
    SEARCH_MEETING_PROPERTIES,
};
use crate::domain::object::association_type;
use crate::domain::task::{PROP_OWNER, PROP_TIMESTAMP};
use crate::domain::{AssociationSpec, ObjectType};
use crate::errors::CrmResult;
use crate::query::{clamp_limit, Filter, FilterOperator, SearchRequest, Sort, SortDirection};
use crate::time::iso_to_millis;

/// Upper bound of meeting links read before filtering and truncation.
const DEAL_MEETING_SCAN_LIMIT: u32 = 500;

#[derive(Clone, Debug, Default)]
pub struct NewMeeting {
    pub title: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub description: Option<String>,
    pub owner_id: Option<String>,
    pub outcome: Option<String>,
    pub location: Option<String>,
    pub contact_ids: Vec<String>,
    pub deal_ids: Vec<String>,
    pub meeting_type: Option<String>,
    pub internal_notes: Option<String>,
}

#[derive(Clone, Debug)]
pub struct DealMeetingsQuery {
    pub deal_id: String,
    /// Applied after filtering and sorting; 0 keeps everything.
    pub limit: u32,
    pub outcome_filter: Option<String>,
    pub exclude_calendly: bool,
    pub sort_direction: SortDirection,
}

impl DealMeetingsQuery {
    pub fn new(deal_id: impl Into<String>) -> Self {
        Self {
            deal_id: deal_id.into(),
            limit: 100,
            outcome_filter: None,
            exclude_calendly: false,
            sort_direction: SortDirection::Descending,
        }
    }
}

impl HubSpotService {
    pub async fn get_meeting_details(&self, meeting_id: &str, properties: &[String]) -> CrmResult<Value> {
        let meeting = self.client.get_object(ObjectType::Meeting, meeting_id, properties).await?;
        info!(event_name = "crm.meetings.read", meeting_id = %meeting_id, "retrieved meeting details");
        Ok(meeting)
    }

    pub async fn create_meeting(&self, meeting: NewMeeting) -> CrmResult<Value> {
        info!(event_name = "crm.meetings.create", title = %meeting.title, "creating meeting");

        let start_ms = iso_to_millis(&meeting.start_time)?.to_string();
        let mut properties = Map::new();
        properties.insert(PROP_TIMESTAMP.into(), json!(start_ms));
        properties.insert(PROP_START_TIME.into(), json!(start_ms));
        properties.insert(PROP_TITLE.into(), json!(meeting.title));
        if let Some(end_time) = non_empty(meeting.end_time.as_deref()) {
            properties.insert(PROP_END_TIME.into(), json!(iso_to_millis(end_time)?.to_string()));
        }
        for (name, value) in [
            (PROP_BODY, &meeting.description),
            (PROP_OWNER, &meeting.owner_id),
            (PROP_OUTCOME, &meeting.outcome),
            (PROP_LOCATION, &meeting.location),
            (PROP_INTERNAL_NOTES, &meeting.internal_notes),
        ] {
            if let Some(value) = non_empty(value.as_deref()) {
                properties.insert(name.into(), json!(value));
            }
        }
        properties.insert(
            PROP_ACTIVITY_TYPE.into(),
            json!(self.resolve_meeting_type(meeting.meeting_type.as_deref())),
        );

        let associations: Vec<Value> = meeting
            .contact_ids
            .iter()
            .map(|id| AssociationSpec::new(id.as_str(), association_type::MEETING_TO_CONTACT))
            .chain(
                meeting
                    .deal_ids
                    .iter()
                    .map(|id| AssociationSpec::new(id.as_str(), association_type::MEETING_TO_DEAL)),
            )
            .map(|spec| spec.to_json())
            .collect();

        let body = json!({ "properties": properties, "associations": associations });
        let created = self.client.create_object(ObjectType::Meeting, body).await?;
        info!(
            event_name = "crm.meetings.created",
            meeting_id = %record_id(&created).unwrap_or_default(),
            "created meeting"
        );
        Ok(created)
    }

    /// A configured activity type; unknown or missing requests use the first one.
    fn resolve_meeting_type(&self, requested: Option<&str>) -> String {
        let fallback = self.meeting_types.first().cloned().unwrap_or_default();
        match non_empty(requested) {
            Some(requested) if self.meeting_types.iter().any(|known| known == requested) => {
                requested.to_string()
            }
            Some(requested) => {
                warn!(
                    event_name = "crm.meetings.unknown_type",
                    requested = %requested,
                    fallback = %fallback,
                    "meeting type is not configured, using fallback"
                );
                fallback
            }
            None => fallback,
        }
    }

    pub async fn get_deal_meetings(&self, query: DealMeetingsQuery) -> CrmResult<Value> {
        let deal_id = query.deal_id.as_str();
        let listing = self
            .client
            .list_associations(ObjectType::Deal, deal_id, ObjectType::Meeting, Some(DEAL_MEETING_SCAN_LIMIT))
            .await?;
        let meeting_ids = association_target_ids(&listing);
        if meeting_ids.is_empty() {
            info!(event_name = "crm.meetings.none_for_deal", deal_id = %deal_id, "no meetings found for deal");
            return Ok(empty_for_deal(deal_id));
        }

        let mut request = HydrationRequest::new(ObjectType::Meeting, &meeting_ids, MEETING_PROPERTIES)
            .sort(Sort::new(PROP_START_TIME, query.sort_direction));
        if let Some(outcome) = non_empty(query.outcome_filter.as_deref()) {
            request = request.filter(Filter::eq(PROP_OUTCOME, outcome));
        }
        let mut meetings = self.resolver.hydrate(&request).await;

        if query.exclude_calendly {
            meetings.retain(|meeting| {
                let automated = is_calendly_meeting(meeting);
                if automated {
                    debug!(
                        event_name = "crm.meetings.automated_excluded",
                        meeting_id = %record_id(meeting).unwrap_or_default(),
                        "excluding automated booking"
                    );
                }
                !automated
            });
        }
        sort_by_start_time(&mut meetings, query.sort_direction);
        if query.limit > 0 {
            meetings.truncate(query.limit as usize);
        }

        info!(
            event_name = "crm.meetings.for_deal",
            deal_id = %deal_id,
            count = meetings.len(),
            "retrieved deal meetings"
        );
        Ok(json!({
            "total": meetings.len(),
            "results": meetings,
            "deal_id": deal_id,
            "associations": listing,
        }))
    }

    /// Meetings whose description contains `search_term`.
    pub async fn search_meetings(
        &self,
        search_term: &str,
        limit: u32,
        sort_direction: SortDirection,
    ) -> CrmResult<Value> {
        let request = SearchRequest::new(SEARCH_MEETING_PROPERTIES)
            .filter(Filter::new(PROP_BODY, FilterOperator::ContainsToken, search_term))
            .sort(PROP_START_TIME, sort_direction)
            .limit(clamp_limit(limit));

        let response = self.client.search(ObjectType::Meeting, &request).await?;
        info!(
            event_name = "crm.meetings.searched",
            search_term = %search_term,
            count = results(&response).len(),
            "found meetings"
        );
        Ok(response)
    }
}
