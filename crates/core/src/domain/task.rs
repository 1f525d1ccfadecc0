use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{property, set_field};
use crate::time::{parse_timestamp_ms, MILLIS_PER_DAY};

pub const STATUS_NOT_STARTED: &str = "NOT_STARTED";
pub const STATUS_IN_PROGRESS: &str = "IN_PROGRESS";
pub const STATUS_COMPLETED: &str = "COMPLETED";
pub const STATUS_DEFERRED: &str = "DEFERRED";

/// Statuses that can never be overdue.
pub const TERMINAL_STATUSES: [&str; 2] = [STATUS_COMPLETED, STATUS_DEFERRED];

pub const PROP_SUBJECT: &str = "hs_task_subject";
pub const PROP_BODY: &str = "hs_task_body";
pub const PROP_STATUS: &str = "hs_task_status";
pub const PROP_PRIORITY: &str = "hs_task_priority";
pub const PROP_TYPE: &str = "hs_task_type";
pub const PROP_DUE_DATE: &str = "hs_task_due_date";
pub const PROP_TIMESTAMP: &str = "hs_timestamp";
pub const PROP_OWNER: &str = "hubspot_owner_id";

pub const TASK_PROPERTIES: &[&str] = &[
    PROP_SUBJECT,
    PROP_BODY,
    PROP_STATUS,
    PROP_PRIORITY,
    PROP_OWNER,
    PROP_TYPE,
    PROP_TIMESTAMP,
    "hs_createdate",
    PROP_DUE_DATE,
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverdueStatus {
    pub is_overdue: bool,
    pub overdue_days: i64,
}

impl OverdueStatus {
    /// Overdue when the status is not terminal and the due instant is before `now_ms`.
    ///
    /// Missing or unparseable due values yield the default `(false, 0)`.
    pub fn compute(status: Option<&str>, due: Option<&str>, now_ms: i64) -> Self {
        if status.is_some_and(|status| TERMINAL_STATUSES.contains(&status)) {
            return Self::default();
        }
        let Some(due_ms) = due.and_then(parse_timestamp_ms) else {
            return Self::default();
        };
        if due_ms >= now_ms {
            return Self::default();
        }
        match now_ms.checked_sub(due_ms) {
            Some(elapsed) => Self { is_overdue: true, overdue_days: elapsed.div_euclid(MILLIS_PER_DAY) },
            None => Self::default(),
        }
    }

    /// Reads status and due date from a task record.
    pub fn for_task(task: &Value, now_ms: i64) -> Self {
        Self::compute(property(task, PROP_STATUS), due_value(task), now_ms)
    }
}

/// `hs_task_due_date` when present and non-empty, else `hs_timestamp`.
pub fn due_value(task: &Value) -> Option<&str> {
    property(task, PROP_DUE_DATE)
        .filter(|value| !value.trim().is_empty())
        .or_else(|| property(task, PROP_TIMESTAMP))
}

/// Writes `is_overdue` / `overdue_days` onto every task; returns the overdue count.
pub fn annotate_overdue(tasks: &mut [Value], now_ms: i64) -> usize {
    let mut overdue = 0;
    for task in tasks.iter_mut() {
        let status = OverdueStatus::for_task(task, now_ms);
        if status.is_overdue {
            overdue += 1;
        }
        set_field(task, "is_overdue", Value::Bool(status.is_overdue));
        set_field(task, "overdue_days", Value::from(status.overdue_days));
    }
    overdue
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealRef {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRef {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Joined associations attached to an enriched task.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAssociations {
    pub deals: Vec<DealRef>,
    pub contacts: Vec<ContactRef>,
}
