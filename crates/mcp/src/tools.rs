//! MCP tools for Hubbridge
//!
//! Tools are grouped by the CRM records they act on:
//! - Task: task lifecycle, listings, overdue views
//! - Meeting: meeting details, creation, deal timelines, search
//! - Note: deal notes
//! - Lookup: deal and contact search

/// Task tools category
pub struct TaskTools;

/// Meeting tools category
pub struct MeetingTools;

/// Note tools category
pub struct NoteTools;

/// Lookup tools category
pub struct LookupTools;

/// Tool category trait
pub trait ToolCategory {
    /// Category name
    fn category_name() -> &'static str
    where
        Self: Sized;
    /// List of tool names in this category
    fn tool_names() -> &'static [&'static str]
    where
        Self: Sized;
}

impl ToolCategory for TaskTools {
    fn category_name() -> &'static str {
        "task"
    }
    fn tool_names() -> &'static [&'static str] {
        &[
            "create_task",
            "get_tasks",
            "get_task_details",
            "complete_task",
            "update_task",
            "get_overdue_tasks",
            "get_tasks_for_deal",
            "get_tasks_for_contact",
        ]
    }
}

impl ToolCategory for MeetingTools {
    fn category_name() -> &'static str {
        "meeting"
    }
    fn tool_names() -> &'static [&'static str] {
        &["get_meeting_details", "create_meeting", "get_deal_meetings", "search_meetings"]
    }
}

impl ToolCategory for NoteTools {
    fn category_name() -> &'static str {
        "note"
    }
    fn tool_names() -> &'static [&'static str] {
        &["get_deal_notes"]
    }
}

impl ToolCategory for LookupTools {
    fn category_name() -> &'static str {
        "lookup"
    }
    fn tool_names() -> &'static [&'static str] {
        &["search_deals", "search_contacts"]
    }
}

/// All tool names
pub const ALL_TOOL_NAMES: &[&str] = &[
    "create_task",
    "get_tasks",
    "get_task_details",
    "complete_task",
    "update_task",
    "get_overdue_tasks",
    "get_tasks_for_deal",
    "get_tasks_for_contact",
    "get_meeting_details",
    "create_meeting",
    "get_deal_meetings",
    "search_meetings",
    "get_deal_notes",
    "search_deals",
    "search_contacts",
];

/// Total number of tools
pub const TOTAL_TOOLS: usize = ALL_TOOL_NAMES.len();
