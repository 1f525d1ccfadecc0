use serde_json::{json, Value};
use tracing::info;

use super::HubSpotService;
use crate::associations::HydrationRequest;
use crate::client::association_target_ids;
use crate::domain::ObjectType;
use crate::errors::CrmResult;
use crate::query::{Sort, SortDirection};

const PROP_NOTE_TIMESTAMP: &str = "hs_timestamp";

const NOTE_PROPERTIES: &[&str] = &[
    "hs_note_body",
    PROP_NOTE_TIMESTAMP,
    "hubspot_owner_id",
    "hs_createdate",
    "hs_lastmodifieddate",
];

impl HubSpotService {
    /// Notes linked to a deal, ordered by note timestamp.
    ///
    /// An unknown deal and a deal without notes both yield an empty result.
    pub async fn get_deal_notes(
        &self,
        deal_id: &str,
        limit: u32,
        sort_direction: SortDirection,
    ) -> CrmResult<Value> {
        let listing = match self
            .client
            .list_associations(ObjectType::Deal, deal_id, ObjectType::Note, Some(limit))
            .await
        {
            Ok(listing) => listing,
            Err(error) if error.is_not_found() => {
                info!(event_name = "crm.notes.deal_not_found", deal_id = %deal_id, "deal not found or no note associations");
                return Ok(empty_for_deal(deal_id));
            }
            Err(error) => return Err(error),
        };

        let note_ids = association_target_ids(&listing);
        if note_ids.is_empty() {
            return Ok(empty_for_deal(deal_id));
        }

        let request = HydrationRequest::new(ObjectType::Note, &note_ids, NOTE_PROPERTIES)
            .sort(Sort::new(PROP_NOTE_TIMESTAMP, sort_direction));
        let notes = self.resolver.hydrate(&request).await;

        info!(event_name = "crm.notes.listed", deal_id = %deal_id, count = notes.len(), "retrieved deal notes");
        Ok(json!({
            "total": notes.len(),
            "results": notes,
            "deal_id": deal_id,
            "associations": listing,
        }))
    }
}

pub(super) fn empty_for_deal(deal_id: &str) -> Value {
    json!({ "results": [], "total": 0, "deal_id": deal_id })
}
