use serde_json::{json, Value};
use tracing::{info, warn};

use super::{non_empty, HubSpotService};
use crate::document::{record_id, results};
use crate::domain::ObjectType;
use crate::errors::{CrmError, CrmResult};
use crate::query::{clamp_limit, Filter, FilterOperator, SearchRequest, SortDirection};

const PROP_LAST_MODIFIED: &str = "hs_lastmodifieddate";

const DEAL_SEARCH_PROPERTIES: &[&str] = &[
    "dealname",
    "dealstage",
    "amount",
    "closedate",
    "pipeline",
    PROP_LAST_MODIFIED,
    "hs_createdate",
    "hubspot_owner_id",
];

const DEAL_INFO_PROPERTIES: &[&str] =
    &["dealname", "dealstage", "amount", "closedate", "pipeline", PROP_LAST_MODIFIED];

const CONTACT_SEARCH_PROPERTIES: &[&str] = &[
    "firstname",
    "lastname",
    "email",
    "phone",
    "company",
    PROP_LAST_MODIFIED,
    "hs_createdate",
    "hubspot_owner_id",
];

const CONTACT_INFO_PROPERTIES: &[&str] =
    &["firstname", "lastname", "email", "phone", "company", PROP_LAST_MODIFIED];

/// Candidates considered when a record is resolved by name.
const NAME_MATCH_CANDIDATES: u32 = 5;

impl HubSpotService {
    /// Deals whose name contains `deal_name`, most recently modified first.
    pub async fn search_deals(&self, deal_name: &str, limit: u32) -> CrmResult<Value> {
        let request = SearchRequest::new(DEAL_SEARCH_PROPERTIES)
            .filter(Filter::new("dealname", FilterOperator::ContainsToken, deal_name))
            .sort(PROP_LAST_MODIFIED, SortDirection::Descending)
            .limit(clamp_limit(limit));

        let response = self.client.search(ObjectType::Deal, &request).await?;
        info!(
            event_name = "crm.deals.searched",
            deal_name = %deal_name,
            count = results(&response).len(),
            "found deals by name"
        );
        Ok(response)
    }

    /// Exact email match when an email is given, otherwise a free-text name query.
    pub async fn search_contacts(
        &self,
        contact_name: Option<&str>,
        contact_email: Option<&str>,
        limit: u32,
    ) -> CrmResult<Value> {
        let mut request = SearchRequest::new(CONTACT_SEARCH_PROPERTIES)
            .sort(PROP_LAST_MODIFIED, SortDirection::Descending)
            .limit(clamp_limit(limit));
        request = match (non_empty(contact_email), non_empty(contact_name)) {
            (Some(email), _) => request.filter(Filter::eq("email", email)),
            (None, Some(name)) => request.query(name),
            (None, None) => {
                return Err(CrmError::validation(
                    "Either contact_name or contact_email must be provided",
                ))
            }
        };

        let response = self.client.search(ObjectType::Contact, &request).await?;
        info!(
            event_name = "crm.contacts.searched",
            by_email = non_empty(contact_email).is_some(),
            count = results(&response).len(),
            "found contacts"
        );
        Ok(response)
    }

    /// Best match for a deal name as `(id, record)`; `None` when nothing matches.
    pub(super) async fn find_deal(&self, deal_name: &str) -> CrmResult<Option<(String, Value)>> {
        let response = self.search_deals(deal_name, NAME_MATCH_CANDIDATES).await?;
        Ok(first_match(&response))
    }

    pub(super) async fn find_contact(
        &self,
        contact_name: Option<&str>,
        contact_email: Option<&str>,
    ) -> CrmResult<Option<(String, Value)>> {
        let response = self.search_contacts(contact_name, contact_email, NAME_MATCH_CANDIDATES).await?;
        Ok(first_match(&response))
    }

    /// Context record for a known deal id; degrades to `{id}` on failure.
    pub(super) async fn deal_info(&self, deal_id: &str) -> Value {
        self.info_or_stub(ObjectType::Deal, deal_id, DEAL_INFO_PROPERTIES).await
    }

    pub(super) async fn contact_info(&self, contact_id: &str) -> Value {
        self.info_or_stub(ObjectType::Contact, contact_id, CONTACT_INFO_PROPERTIES).await
    }

    async fn info_or_stub(&self, object_type: ObjectType, id: &str, properties: &[&str]) -> Value {
        match self.client.get_object(object_type, id, properties).await {
            Ok(record) => record,
            Err(error) => {
                warn!(
                    event_name = "crm.lookup.info_failed",
                    object_type = %object_type,
                    record_id = %id,
                    error = %error,
                    "failed to read record info"
                );
                json!({ "id": id })
            }
        }
    }
}

fn first_match(response: &Value) -> Option<(String, Value)> {
    let record = results(response).first()?;
    Some((record_id(record)?, record.clone()))
}
