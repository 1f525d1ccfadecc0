use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use tracing::info;

use super::{non_empty, replace_results, HubSpotService};
use crate::document::{property, record_id, set_field, take_results};
use crate::domain::object::association_type;
use crate::domain::task::{
    annotate_overdue, PROP_BODY, PROP_OWNER, PROP_PRIORITY, PROP_STATUS, PROP_SUBJECT,
    PROP_TIMESTAMP, PROP_TYPE, STATUS_COMPLETED, STATUS_IN_PROGRESS, STATUS_NOT_STARTED,
    TASK_PROPERTIES,
};
use crate::domain::{AssociationSpec, ObjectType};
use crate::errors::{CrmError, CrmResult};
use crate::query::{clamp_limit, Filter, FilterOperator, SearchRequest, SortDirection, TaskQuery};
use crate::time::iso_to_millis;

#[derive(Clone, Debug, Default)]
pub struct NewTask {
    pub title: String,
    pub assigned_to_user_id: String,
    pub description: Option<String>,
    pub due_date: Option<String>,
    pub priority: Option<String>,
    pub contact_id: Option<String>,
    pub deal_id: Option<String>,
    pub task_type: Option<String>,
}

/// Fields to PATCH; `None` leaves a property untouched, `Some("")` clears it.
/// `due_date` is the exception: it must parse as a date, so an empty one is rejected.
#[derive(Clone, Debug, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assigned_to_user_id: Option<String>,
    pub due_date: Option<String>,
    pub task_type: Option<String>,
}

impl TaskUpdate {
    fn to_properties(&self) -> CrmResult<Map<String, Value>> {
        let mut properties = Map::new();
        let fields = [
            (PROP_SUBJECT, &self.title),
            (PROP_BODY, &self.description),
            (PROP_STATUS, &self.status),
            (PROP_PRIORITY, &self.priority),
            (PROP_OWNER, &self.assigned_to_user_id),
            (PROP_TYPE, &self.task_type),
        ];
        for (name, value) in fields {
            if let Some(value) = value {
                properties.insert(name.to_string(), Value::String(value.clone()));
            }
        }
        if let Some(due_date) = &self.due_date {
            properties.insert(PROP_TIMESTAMP.to_string(), Value::String(iso_to_millis(due_date)?.to_string()));
        }

        if properties.is_empty() {
            return Err(CrmError::validation("At least one property must be provided to update"));
        }
        Ok(properties)
    }
}

#[derive(Clone, Debug, Default)]
pub struct TaskCompletion {
    pub completion_notes: Option<String>,
    pub update_properties: BTreeMap<String, String>,
}

/// `get_tasks` arguments: server-side intents plus association membership.
#[derive(Clone, Debug, Default)]
pub struct TaskSearch {
    pub query: TaskQuery,
    pub contact_id: Option<String>,
    pub deal_id: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct TasksForDeal {
    pub deal_id: Option<String>,
    pub deal_name: Option<String>,
    pub include_completed: bool,
    pub limit: u32,
}

#[derive(Clone, Debug, Default)]
pub struct TasksForContact {
    pub contact_id: Option<String>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub include_completed: bool,
    pub limit: u32,
}

impl HubSpotService {
    pub async fn create_task(&self, task: NewTask) -> CrmResult<Value> {
        info!(event_name = "crm.tasks.create", title = %task.title, "creating task");

        let mut properties = Map::new();
        properties.insert(PROP_SUBJECT.into(), json!(task.title));
        properties.insert(PROP_STATUS.into(), json!(STATUS_NOT_STARTED));
        properties.insert(PROP_OWNER.into(), json!(task.assigned_to_user_id));
        for (name, value) in [
            (PROP_BODY, &task.description),
            (PROP_PRIORITY, &task.priority),
            (PROP_TYPE, &task.task_type),
        ] {
            if let Some(value) = non_empty(value.as_deref()) {
                properties.insert(name.into(), json!(value));
            }
        }
        if let Some(due_date) = non_empty(task.due_date.as_deref()) {
            properties.insert(PROP_TIMESTAMP.into(), json!(iso_to_millis(due_date)?.to_string()));
        }

        let mut associations = Vec::new();
        if let Some(contact_id) = non_empty(task.contact_id.as_deref()) {
            associations.push(AssociationSpec::new(contact_id, association_type::TASK_TO_CONTACT).to_json());
        }
        if let Some(deal_id) = non_empty(task.deal_id.as_deref()) {
            associations.push(AssociationSpec::new(deal_id, association_type::TASK_TO_DEAL).to_json());
        }

        let body = json!({ "properties": properties, "associations": associations });
        let created = self.client.create_object(ObjectType::Task, body).await?;
        let task_id = record_id(&created).unwrap_or_default();
        info!(
            event_name = "crm.tasks.created",
            task_id = %task_id,
            "created task"
        );
        Ok(created)
    }

    pub async fn get_tasks(&self, search: TaskSearch) -> CrmResult<Value> {
        let request = search.query.to_search_request()?;
        let mut response = self.client.search(ObjectType::Task, &request).await?;

        let contact_id = non_empty(search.contact_id.as_deref());
        let deal_id = non_empty(search.deal_id.as_deref());
        let mut tasks = take_results(&mut response);
        if contact_id.is_some() || deal_id.is_some() {
            tasks = self.resolver.retain_associated(tasks, contact_id, deal_id).await;
            set_field(&mut response, "total", Value::from(tasks.len()));
        }

        let overdue = annotate_overdue(&mut tasks, self.now_ms());
        info!(
            event_name = "crm.tasks.listed",
            count = tasks.len(),
            overdue_count = overdue,
            "retrieved tasks"
        );
        set_field(&mut response, "results", Value::Array(tasks));
        Ok(response)
    }

    pub async fn get_task_details(&self, task_id: &str, properties: &[String]) -> CrmResult<Value> {
        self.client.get_object(ObjectType::Task, task_id, properties).await
    }

    pub async fn complete_task(&self, task_id: &str, completion: TaskCompletion) -> CrmResult<Value> {
        let mut properties = Map::new();
        properties.insert(PROP_STATUS.into(), json!(STATUS_COMPLETED));
        if let Some(notes) = non_empty(completion.completion_notes.as_deref()) {
            properties.insert(PROP_BODY.into(), json!(notes));
        }
        for (name, value) in completion.update_properties {
            properties.insert(name, Value::String(value));
        }

        let updated = self.client.update_object(ObjectType::Task, task_id, properties).await?;
        info!(
            event_name = "crm.tasks.completed",
            task_id = %task_id,
            status = property(&updated, PROP_STATUS).unwrap_or(""),
            "completed task"
        );
        Ok(updated)
    }

    pub async fn update_task(&self, task_id: &str, update: TaskUpdate) -> CrmResult<Value> {
        let properties = update.to_properties()?;
        let updated_properties: Vec<String> = properties.keys().cloned().collect();

        let updated = self.client.update_object(ObjectType::Task, task_id, properties).await?;
        info!(
            event_name = "crm.tasks.updated",
            task_id = %task_id,
            updated_properties = ?updated_properties,
            "updated task"
        );
        Ok(updated)
    }

    /// Open tasks due before now, soonest first, with deal and contact names.
    pub async fn get_overdue_tasks(&self, owner_id: Option<&str>, limit: u32) -> CrmResult<Value> {
        let now_ms = self.now_ms();
        let mut request = SearchRequest::new(TASK_PROPERTIES)
            .filter(Filter::one_of(PROP_STATUS, [STATUS_NOT_STARTED, STATUS_IN_PROGRESS]))
            .filter(Filter::new(PROP_TIMESTAMP, FilterOperator::Lt, now_ms.to_string()))
            .sort(PROP_TIMESTAMP, SortDirection::Ascending)
            .limit(clamp_limit(limit));
        if let Some(owner_id) = non_empty(owner_id) {
            request = request.filter(Filter::eq(PROP_OWNER, owner_id));
        }

        let mut response = self.client.search(ObjectType::Task, &request).await?;
        let mut tasks = take_results(&mut response);
        annotate_overdue(&mut tasks, now_ms);
        self.resolver.enrich_tasks(&mut tasks).await;

        info!(event_name = "crm.tasks.overdue_listed", count = tasks.len(), "retrieved overdue tasks");
        set_field(&mut response, "results", Value::Array(tasks));
        Ok(response)
    }

    pub async fn get_tasks_for_deal(&self, query: TasksForDeal) -> CrmResult<Value> {
        let (deal_id, deal_info) = match (
            non_empty(query.deal_id.as_deref()),
            non_empty(query.deal_name.as_deref()),
        ) {
            (Some(deal_id), _) => (deal_id.to_string(), self.deal_info(deal_id).await),
            (None, Some(deal_name)) => match self.find_deal(deal_name).await? {
                Some(found) => found,
                None => {
                    info!(event_name = "crm.tasks.deal_not_found", deal_name = %deal_name, "no deal matched name");
                    return Ok(json!({
                        "results": [],
                        "total": 0,
                        "deal_info": null,
                        "message": format!("No deals found matching '{deal_name}'"),
                    }));
                }
            },
            (None, None) => {
                return Err(CrmError::validation("Either deal_id or deal_name must be provided"))
            }
        };

        let mut response = self
            .tasks_associated_with("associations.deal", &deal_id, query.include_completed, query.limit)
            .await?;
        set_field(&mut response, "deal_info", deal_info);
        info!(event_name = "crm.tasks.for_deal", deal_id = %deal_id, "retrieved tasks for deal");
        Ok(response)
    }

    pub async fn get_tasks_for_contact(&self, query: TasksForContact) -> CrmResult<Value> {
        let contact_name = non_empty(query.contact_name.as_deref());
        let contact_email = non_empty(query.contact_email.as_deref());
        let (contact_id, contact_info) = match non_empty(query.contact_id.as_deref()) {
            Some(contact_id) => (contact_id.to_string(), self.contact_info(contact_id).await),
            None if contact_name.is_some() || contact_email.is_some() => {
                match self.find_contact(contact_name, contact_email).await? {
                    Some(found) => found,
                    None => {
                        let search_term = contact_email.or(contact_name).unwrap_or_default();
                        info!(
                            event_name = "crm.tasks.contact_not_found",
                            search_term = %search_term,
                            "no contact matched search"
                        );
                        return Ok(json!({
                            "results": [],
                            "total": 0,
                            "contact_info": null,
                            "message": format!("No contacts found matching '{search_term}'"),
                        }));
                    }
                }
            }
            None => {
                return Err(CrmError::validation(
                    "Either contact_id, contact_name, or contact_email must be provided",
                ))
            }
        };

        let mut response = self
            .tasks_associated_with("associations.contact", &contact_id, query.include_completed, query.limit)
            .await?;
        set_field(&mut response, "contact_info", contact_info);
        info!(event_name = "crm.tasks.for_contact", contact_id = %contact_id, "retrieved tasks for contact");
        Ok(response)
    }

    async fn tasks_associated_with(
        &self,
        association_property: &str,
        record_id: &str,
        include_completed: bool,
        limit: u32,
    ) -> CrmResult<Value> {
        let mut request = SearchRequest::new(TASK_PROPERTIES)
            .filter(Filter::eq(association_property, record_id))
            .sort(PROP_TIMESTAMP, SortDirection::Ascending)
            .limit(clamp_limit(limit));
        if !include_completed {
            request = request.filter(Filter::new(PROP_STATUS, FilterOperator::Neq, STATUS_COMPLETED));
        }

        let mut response = self.client.search(ObjectType::Task, &request).await?;
        let mut tasks = take_results(&mut response);
        annotate_overdue(&mut tasks, self.now_ms());
        replace_results(&mut response, tasks);
        Ok(response)
    }
}
