use std::fmt;

use serde::{Deserialize, Serialize};

/// CRM object types this adapter touches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Task,
    Meeting,
    Note,
    Deal,
    Contact,
}

impl ObjectType {
    /// Path segment for v3 object endpoints (`/crm/v3/objects/{plural}`).
    pub fn plural(&self) -> &'static str {
        match self {
            Self::Task => "tasks",
            Self::Meeting => "meetings",
            Self::Note => "notes",
            Self::Deal => "deals",
            Self::Contact => "contacts",
        }
    }

    /// Path segment for v4 association endpoints (`/crm/v4/objects/{singular}`).
    pub fn singular(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Meeting => "meeting",
            Self::Note => "note",
            Self::Deal => "deal",
            Self::Contact => "contact",
        }
    }

    pub fn object_path(&self) -> String {
        format!("/crm/v3/objects/{}", self.plural())
    }

    pub fn record_path(&self, id: &str) -> String {
        format!("/crm/v3/objects/{}/{id}", self.plural())
    }

    pub fn search_path(&self) -> String {
        format!("/crm/v3/objects/{}/search", self.plural())
    }

    pub fn batch_read_path(&self) -> String {
        format!("/crm/v3/objects/{}/batch/read", self.plural())
    }

    pub fn associations_path(&self, id: &str, to: ObjectType) -> String {
        format!("/crm/v4/objects/{}/{id}/associations/{}", self.singular(), to.singular())
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.singular())
    }
}

/// HUBSPOT_DEFINED association type ids used when creating engagements.
pub mod association_type {
    pub const MEETING_TO_CONTACT: u32 = 200;
    pub const MEETING_TO_DEAL: u32 = 212;
    pub const TASK_TO_CONTACT: u32 = 204;
    pub const TASK_TO_DEAL: u32 = 216;
}

/// One association to attach in a create payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssociationSpec {
    pub to_id: String,
    pub type_id: u32,
}

impl AssociationSpec {
    pub fn new(to_id: impl Into<String>, type_id: u32) -> Self {
        Self { to_id: to_id.into(), type_id }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "to": {"id": self.to_id},
            "types": [{
                "associationCategory": "HUBSPOT_DEFINED",
                "associationTypeId": self.type_id,
            }],
        })
    }
}
