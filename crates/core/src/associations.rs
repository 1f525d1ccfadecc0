//! Association traversal, hydration of id lists, and task enrichment.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::{association_target_ids, HubSpotClient};
use crate::document::{property_or_empty, record_id, results, set_field, take_results};
use crate::domain::{ContactRef, DealRef, ObjectType, TaskAssociations};
use crate::errors::CrmResult;
use crate::query::{Filter, SearchRequest, Sort, PROP_OBJECT_ID, SEARCH_LIMIT_MAX};

/// Maximum inputs per batch read call.
pub const BATCH_READ_MAX: usize = 100;

const DEAL_LOOKUP_PROPERTIES: &[&str] = &["dealname"];
const CONTACT_LOOKUP_PROPERTIES: &[&str] = &["firstname", "lastname", "email"];

/// Ids to turn into records, with optional narrowing and ordering.
#[derive(Clone, Debug)]
pub struct HydrationRequest<'a> {
    pub object_type: ObjectType,
    pub ids: &'a [String],
    pub properties: &'a [&'a str],
    pub filters: Vec<Filter>,
    pub sort: Option<Sort>,
}

impl<'a> HydrationRequest<'a> {
    pub fn new(object_type: ObjectType, ids: &'a [String], properties: &'a [&'a str]) -> Self {
        Self { object_type, ids, properties, filters: Vec::new(), sort: None }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }
}

pub struct AssociationResolver {
    client: Arc<HubSpotClient>,
}

impl AssociationResolver {
    pub fn new(client: Arc<HubSpotClient>) -> Self {
        Self { client }
    }

    /// Target ids linked from one record, in API order.
    pub async fn associated_ids(
        &self,
        from: ObjectType,
        from_id: &str,
        to: ObjectType,
        limit: Option<u32>,
    ) -> CrmResult<Vec<String>> {
        let listing = self.client.list_associations(from, from_id, to, limit).await?;
        Ok(association_target_ids(&listing))
    }

    /// Resolves ids to records. Never fails: the search API is tried first,
    /// then batch reads, then one GET per id, and unreadable ids are dropped.
    pub async fn hydrate(&self, request: &HydrationRequest<'_>) -> Vec<Value> {
        if request.ids.is_empty() {
            return Vec::new();
        }

        if request.ids.len() <= SEARCH_LIMIT_MAX as usize {
            match self.hydrate_by_search(request).await {
                Ok(mut records) => {
                    if let Some(sort) = &request.sort {
                        sort.apply(&mut records);
                    }
                    return records;
                }
                Err(error) => warn!(
                    event_name = "crm.hydrate.search_failed",
                    object_type = %request.object_type,
                    id_count = request.ids.len(),
                    error = %error,
                    "search hydration failed, falling back to batch read"
                ),
            }
        }

        let mut records = self.read_records(request.object_type, request.ids, request.properties).await;
        records.retain(|record| request.filters.iter().all(|filter| filter.matches(record)));
        if let Some(sort) = &request.sort {
            sort.apply(&mut records);
        }

        info!(
            event_name = "crm.hydrate.fallback_completed",
            object_type = %request.object_type,
            requested = request.ids.len(),
            retrieved = records.len(),
            "hydrated records without search"
        );
        records
    }

    async fn hydrate_by_search(&self, request: &HydrationRequest<'_>) -> CrmResult<Vec<Value>> {
        let mut search = SearchRequest::new(request.properties)
            .filter(Filter::one_of(PROP_OBJECT_ID, request.ids.iter().cloned()))
            .filters(request.filters.iter().cloned())
            .limit(request.ids.len() as u32);
        if let Some(sort) = &request.sort {
            search = search.sort(sort.property_name.clone(), sort.direction);
        }

        let mut response = self.client.search(request.object_type, &search).await?;
        Ok(take_results(&mut response))
    }

    /// Batch read in chunks; a failed chunk degrades to per-id GETs.
    async fn read_records(&self, object_type: ObjectType, ids: &[String], properties: &[&str]) -> Vec<Value> {
        let mut records = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(BATCH_READ_MAX) {
            match self.client.batch_read(object_type, chunk, properties).await {
                Ok(mut response) => {
                    log_batch_errors(object_type, &response);
                    records.extend(take_results(&mut response));
                }
                Err(error) => {
                    warn!(
                        event_name = "crm.hydrate.batch_failed",
                        object_type = %object_type,
                        chunk_size = chunk.len(),
                        error = %error,
                        "batch read failed, reading records one by one"
                    );
                    for id in chunk {
                        match self.client.get_object(object_type, id, properties).await {
                            Ok(record) => records.push(record),
                            Err(error) => warn!(
                                event_name = "crm.hydrate.item_skipped",
                                object_type = %object_type,
                                record_id = %id,
                                error = %error,
                                "skipping unreadable record"
                            ),
                        }
                    }
                }
            }
        }
        records
    }

    /// Best-effort id to record map; failed chunks are logged and left out.
    async fn lookup(&self, object_type: ObjectType, ids: &[String], properties: &[&str]) -> HashMap<String, Value> {
        let mut found = HashMap::new();
        for chunk in ids.chunks(BATCH_READ_MAX) {
            match self.client.batch_read(object_type, chunk, properties).await {
                Ok(response) => {
                    log_batch_errors(object_type, &response);
                    for record in results(&response) {
                        if let Some(id) = record_id(record) {
                            found.insert(id, record.clone());
                        }
                    }
                }
                Err(error) => warn!(
                    event_name = "crm.enrich.lookup_failed",
                    object_type = %object_type,
                    chunk_size = chunk.len(),
                    error = %error,
                    "batch lookup failed, names left empty"
                ),
            }
        }
        found
    }

    /// Attaches `associations: {deals, contacts}` to every task.
    ///
    /// Deal and contact ids are collected across all tasks first so each
    /// distinct record is read once.
    pub async fn enrich_tasks(&self, tasks: &mut [Value]) {
        if tasks.is_empty() {
            return;
        }

        let mut per_task: Vec<Option<(Vec<String>, Vec<String>)>> = Vec::with_capacity(tasks.len());
        let mut deal_ids = UniqueIds::default();
        let mut contact_ids = UniqueIds::default();

        for task in tasks.iter() {
            let Some(task_id) = record_id(task) else {
                per_task.push(None);
                continue;
            };
            let deals = self.associated_or_empty(&task_id, ObjectType::Deal).await;
            let contacts = self.associated_or_empty(&task_id, ObjectType::Contact).await;
            deal_ids.extend(&deals);
            contact_ids.extend(&contacts);
            per_task.push(Some((deals, contacts)));
        }

        let deals = self.lookup(ObjectType::Deal, &deal_ids.ids, DEAL_LOOKUP_PROPERTIES).await;
        let contacts = self.lookup(ObjectType::Contact, &contact_ids.ids, CONTACT_LOOKUP_PROPERTIES).await;

        for (task, links) in tasks.iter_mut().zip(per_task) {
            let associations = match links {
                Some((task_deals, task_contacts)) => TaskAssociations {
                    deals: task_deals.into_iter().map(|id| deal_ref(&deals, id)).collect(),
                    contacts: task_contacts.into_iter().map(|id| contact_ref(&contacts, id)).collect(),
                },
                None => TaskAssociations::default(),
            };
            set_field(task, "associations", serde_json::to_value(associations).unwrap_or_default());
        }

        info!(
            event_name = "crm.enrich.completed",
            task_count = tasks.len(),
            deals_fetched = deals.len(),
            contacts_fetched = contacts.len(),
            "enriched tasks with associations"
        );
    }

    async fn associated_or_empty(&self, task_id: &str, to: ObjectType) -> Vec<String> {
        match self.associated_ids(ObjectType::Task, task_id, to, None).await {
            Ok(ids) => ids,
            Err(error) => {
                warn!(
                    event_name = "crm.enrich.associations_failed",
                    task_id = %task_id,
                    to_object_type = %to,
                    error = %error,
                    "failed to list task associations"
                );
                Vec::new()
            }
        }
    }

    /// Keeps tasks linked to every requested contact/deal. Tasks whose
    /// association lookup fails are dropped.
    pub async fn retain_associated(
        &self,
        tasks: Vec<Value>,
        contact_id: Option<&str>,
        deal_id: Option<&str>,
    ) -> Vec<Value> {
        let requirements: Vec<(ObjectType, &str)> = [(ObjectType::Contact, contact_id), (ObjectType::Deal, deal_id)]
            .into_iter()
            .filter_map(|(to, id)| id.map(|id| (to, id)))
            .collect();
        if requirements.is_empty() {
            return tasks;
        }

        let mut kept = Vec::with_capacity(tasks.len());
        'tasks: for task in tasks {
            let Some(task_id) = record_id(&task) else {
                continue;
            };
            for (to, wanted) in &requirements {
                match self.associated_ids(ObjectType::Task, &task_id, *to, None).await {
                    Ok(ids) if ids.iter().any(|id| id == wanted) => {}
                    Ok(_) => continue 'tasks,
                    Err(error) => {
                        debug!(
                            event_name = "crm.tasks.association_filter_skipped",
                            task_id = %task_id,
                            error = %error,
                            "excluding task with unreadable associations"
                        );
                        continue 'tasks;
                    }
                }
            }
            kept.push(task);
        }
        kept
    }
}

#[derive(Default)]
struct UniqueIds {
    seen: HashSet<String>,
    ids: Vec<String>,
}

impl UniqueIds {
    fn extend(&mut self, ids: &[String]) {
        for id in ids {
            if self.seen.insert(id.clone()) {
                self.ids.push(id.clone());
            }
        }
    }
}

fn deal_ref(deals: &HashMap<String, Value>, id: String) -> DealRef {
    let name = deals.get(&id).map(|deal| property_or_empty(deal, "dealname")).unwrap_or("").to_string();
    DealRef { id, name }
}

fn contact_ref(contacts: &HashMap<String, Value>, id: String) -> ContactRef {
    let Some(contact) = contacts.get(&id) else {
        return ContactRef { id, ..ContactRef::default() };
    };
    let name = format!(
        "{} {}",
        property_or_empty(contact, "firstname"),
        property_or_empty(contact, "lastname")
    )
    .trim()
    .to_string();
    let email = property_or_empty(contact, "email").to_string();
    ContactRef { id, name, email }
}

fn log_batch_errors(object_type: ObjectType, response: &Value) {
    let Some(errors) = response.get("errors").and_then(Value::as_array) else {
        return;
    };
    for error in errors {
        let detail = error.get("message").and_then(serde_json::Value::as_str).unwrap_or("");
        warn!(
            event_name = "crm.batch.item_error",
            object_type = %object_type,
            detail = %detail,
            "batch read reported an item error"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    #[test]
    fn contact_names_join_and_trim() {
        let contacts = HashMap::from([
            ("1".to_string(), json!({"id": "1", "properties": {"firstname": "Ada", "lastname": null, "email": "ada@example.com"}})),
        ]);

        assert_eq!(
            contact_ref(&contacts, "1".to_string()),
            ContactRef { id: "1".into(), name: "Ada".into(), email: "ada@example.com".into() }
        );
        assert_eq!(
            contact_ref(&contacts, "2".to_string()),
            ContactRef { id: "2".into(), name: String::new(), email: String::new() }
        );
    }

    #[test]
    fn missing_deals_get_empty_names() {
        let deals = HashMap::from([("9".to_string(), json!({"id": "9", "properties": {"dealname": "Acme"}}))]);

        assert_eq!(deal_ref(&deals, "9".into()).name, "Acme");
        assert_eq!(deal_ref(&deals, "10".into()).name, "");
    }

    #[test]
    fn unique_ids_keep_first_seen_order() {
        let mut unique = UniqueIds::default();
        unique.extend(&["b".into(), "a".into()]);
        unique.extend(&["a".into(), "c".into(), "b".into()]);

        assert_eq!(unique.ids, vec!["b", "a", "c"]);
    }
}
