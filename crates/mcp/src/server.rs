//! MCP Server Implementation
//!
//! Implements the Model Context Protocol server for Hubbridge.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use hubbridge_core::config::AppConfig;
use hubbridge_core::{
    CrmError, CrmResult, DealMeetingsQuery, HubSpotService, NewMeeting, NewTask, SortDirection,
    TaskCompletion, TaskQuery, TaskSearch, TaskUpdate, TasksForContact, TasksForDeal,
};
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::schemars::{self, JsonSchema};
use rmcp::transport::stdio;
use rmcp::{tool, tool_handler, tool_router, ErrorData, ServerHandler, ServiceExt};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::McpServerError;

/// Main MCP server for Hubbridge
#[derive(Clone)]
pub struct HubbridgeMcpServer {
    service: Arc<HubSpotService>,
    tool_router: ToolRouter<Self>,
}

impl HubbridgeMcpServer {
    /// Build the server and its HTTP client from loaded configuration
    pub fn from_config(config: &AppConfig) -> Result<Self, McpServerError> {
        let service = HubSpotService::from_config(&config.hubspot)?;
        Ok(Self::new(Arc::new(service)))
    }

    /// Run the server with stdio transport
    pub async fn run_stdio(self) -> anyhow::Result<()> {
        info!(event_name = "mcp.server.starting", correlation_id = "bootstrap", "starting mcp server on stdio");

        let service = self.serve(stdio()).await?;
        let quit_reason = service.waiting().await?;

        info!(
            event_name = "mcp.server.stopped",
            correlation_id = "shutdown",
            reason = ?quit_reason,
            "mcp server shutdown complete"
        );
        Ok(())
    }

    /// Tools advertised to clients
    pub fn tools(&self) -> Vec<Tool> {
        self.tool_router.list_all()
    }
}

// Implement ServerHandler trait for MCP protocol
#[tool_handler]
impl ServerHandler for HubbridgeMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Hubbridge MCP Server - HubSpot CRM tools for AI agents. \
                 Manage tasks, review deal meetings and notes, and look up deals and contacts."
                    .to_string(),
            ),
        }
    }
}

// ============================================================================
// Task Tools
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateTaskInput {
    #[schemars(description = "Task subject")]
    pub title: String,

    #[schemars(description = "HubSpot owner id the task is assigned to")]
    pub assigned_to_user_id: String,

    #[schemars(description = "Task body")]
    #[serde(default)]
    pub description: Option<String>,

    #[schemars(description = "Due date in ISO-8601 (e.g. 2025-01-31T17:00:00Z)")]
    #[serde(default)]
    pub due_date: Option<String>,

    #[schemars(description = "HIGH, MEDIUM or LOW")]
    #[serde(default)]
    pub priority: Option<String>,

    #[schemars(description = "Contact to associate the task with")]
    #[serde(default)]
    pub contact_id: Option<String>,

    #[schemars(description = "Deal to associate the task with")]
    #[serde(default)]
    pub deal_id: Option<String>,

    #[schemars(description = "TODO, CALL, EMAIL, ...")]
    #[serde(default)]
    pub task_type: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct GetTasksInput {
    #[schemars(description = "Only tasks owned by this HubSpot owner id")]
    #[serde(default)]
    pub owner_id: Option<String>,

    #[schemars(description = "Only tasks associated with this contact")]
    #[serde(default)]
    pub contact_id: Option<String>,

    #[schemars(description = "Only tasks associated with this deal")]
    #[serde(default)]
    pub deal_id: Option<String>,

    #[schemars(description = "NOT_STARTED, IN_PROGRESS, WAITING, COMPLETED or DEFERRED")]
    #[serde(default)]
    pub status: Option<String>,

    #[schemars(description = "Earliest due date, ISO-8601")]
    #[serde(default)]
    pub due_date_start: Option<String>,

    #[schemars(description = "Latest due date, ISO-8601")]
    #[serde(default)]
    pub due_date_end: Option<String>,

    #[schemars(description = "Maximum results (capped at 100)")]
    #[serde(default = "default_100")]
    pub limit: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TaskDetailsInput {
    pub task_id: String,

    #[schemars(description = "Properties to return; HubSpot defaults when omitted")]
    #[serde(default)]
    pub properties: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CompleteTaskInput {
    #[schemars(description = "Task id")]
    pub task_id: String,

    #[schemars(description = "Notes written into the task body")]
    #[serde(default)]
    pub completion_notes: Option<String>,

    #[schemars(description = "Additional task properties to set")]
    #[serde(default)]
    pub update_properties: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateTaskInput {
    #[schemars(description = "Task id")]
    pub task_id: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[schemars(description = "NOT_STARTED, IN_PROGRESS, WAITING, COMPLETED or DEFERRED")]
    #[serde(default)]
    pub status: Option<String>,

    #[schemars(description = "HIGH, MEDIUM or LOW")]
    #[serde(default)]
    pub priority: Option<String>,

    #[serde(default)]
    pub assigned_to_user_id: Option<String>,

    #[schemars(description = "New due date, ISO-8601")]
    #[serde(default)]
    pub due_date: Option<String>,

    #[serde(default)]
    pub task_type: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct OverdueTasksInput {
    #[schemars(description = "Only tasks owned by this HubSpot owner id")]
    #[serde(default)]
    pub owner_id: Option<String>,

    #[schemars(description = "Maximum results (capped at 100)")]
    #[serde(default = "default_100")]
    pub limit: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TasksForDealInput {
    #[serde(default)]
    pub deal_id: Option<String>,

    #[schemars(description = "Deal name to match when the id is unknown")]
    #[serde(default)]
    pub deal_name: Option<String>,

    #[serde(default)]
    pub include_completed: bool,

    #[serde(default = "default_100")]
    pub limit: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TasksForContactInput {
    #[serde(default)]
    pub contact_id: Option<String>,

    #[schemars(description = "Contact name to match when the id is unknown")]
    #[serde(default)]
    pub contact_name: Option<String>,

    #[schemars(description = "Exact contact email to match when the id is unknown")]
    #[serde(default)]
    pub contact_email: Option<String>,

    #[serde(default)]
    pub include_completed: bool,

    #[serde(default = "default_100")]
    pub limit: u32,
}

// ============================================================================
// Meeting and Note Tools
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MeetingDetailsInput {
    pub meeting_id: String,

    #[schemars(description = "Properties to return; HubSpot defaults when omitted")]
    #[serde(default)]
    pub properties: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateMeetingInput {
    pub title: String,

    #[schemars(description = "Start time, ISO-8601")]
    pub start_time: String,

    #[schemars(description = "End time, ISO-8601")]
    #[serde(default)]
    pub end_time: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub owner_id: Option<String>,

    #[schemars(description = "SCHEDULED, COMPLETED, RESCHEDULED, NO_SHOW or CANCELED")]
    #[serde(default)]
    pub outcome: Option<String>,

    #[serde(default)]
    pub location: Option<String>,

    #[serde(default)]
    pub contact_ids: Vec<String>,

    #[serde(default)]
    pub deal_ids: Vec<String>,

    #[schemars(description = "Activity type configured in HubSpot; defaults to the first configured type")]
    #[serde(default)]
    pub meeting_type: Option<String>,

    #[serde(default)]
    pub internal_notes: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DealMeetingsInput {
    pub deal_id: String,

    #[schemars(description = "Maximum meetings returned after filtering")]
    #[serde(default = "default_100")]
    pub limit: u32,

    #[schemars(description = "Only meetings with this outcome")]
    #[serde(default)]
    pub outcome_filter: Option<String>,

    #[schemars(description = "Drop meetings that look like automated bookings")]
    #[serde(default)]
    pub exclude_calendly: bool,

    #[schemars(description = "ASCENDING or DESCENDING by start time")]
    #[serde(default)]
    pub sort_direction: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DealNotesInput {
    pub deal_id: String,

    #[serde(default = "default_100")]
    pub limit: u32,

    #[schemars(description = "ASCENDING or DESCENDING by note timestamp")]
    #[serde(default)]
    pub sort_direction: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchMeetingsInput {
    #[schemars(description = "Term to find in meeting descriptions")]
    pub search_term: String,

    #[serde(default = "default_10")]
    pub limit: u32,

    #[serde(default)]
    pub sort_direction: Option<String>,
}

// ============================================================================
// Lookup Tools
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchDealsInput {
    pub deal_name: String,

    #[serde(default = "default_10")]
    pub limit: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchContactsInput {
    #[serde(default)]
    pub contact_name: Option<String>,

    #[schemars(description = "Exact email; preferred over the name when both are given")]
    #[serde(default)]
    pub contact_email: Option<String>,

    #[serde(default = "default_10")]
    pub limit: u32,
}

#[tool_router]
impl HubbridgeMcpServer {
    pub fn new(service: Arc<HubSpotService>) -> Self {
        Self { service, tool_router: Self::tool_router() }
    }

    #[tool(description = "Create a task assigned to a HubSpot user, optionally linked to a contact and deal")]
    pub async fn create_task(
        &self,
        Parameters(input): Parameters<CreateTaskInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let task = NewTask {
            title: input.title,
            assigned_to_user_id: input.assigned_to_user_id,
            description: input.description,
            due_date: input.due_date,
            priority: input.priority,
            contact_id: input.contact_id,
            deal_id: input.deal_id,
            task_type: input.task_type,
        };
        run_tool("create_task", self.service.create_task(task)).await
    }

    #[tool(description = "List tasks filtered by owner, status, due date range, contact or deal, with overdue flags")]
    pub async fn get_tasks(
        &self,
        Parameters(input): Parameters<GetTasksInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let search = TaskSearch {
            query: TaskQuery {
                owner_id: input.owner_id,
                status: input.status,
                due_date_start: input.due_date_start,
                due_date_end: input.due_date_end,
                limit: input.limit,
            },
            contact_id: input.contact_id,
            deal_id: input.deal_id,
        };
        run_tool("get_tasks", self.service.get_tasks(search)).await
    }

    #[tool(description = "Get a task by id")]
    pub async fn get_task_details(
        &self,
        Parameters(input): Parameters<TaskDetailsInput>,
    ) -> Result<CallToolResult, ErrorData> {
        run_tool("get_task_details", self.service.get_task_details(&input.task_id, &input.properties))
            .await
    }

    #[tool(description = "Mark a task COMPLETED, optionally recording notes and other property changes")]
    pub async fn complete_task(
        &self,
        Parameters(input): Parameters<CompleteTaskInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let completion = TaskCompletion {
            completion_notes: input.completion_notes,
            update_properties: input.update_properties,
        };
        run_tool("complete_task", self.service.complete_task(&input.task_id, completion)).await
    }

    #[tool(description = "Update only the provided fields of a task; an empty string clears a field, except due_date which must be a valid date")]
    pub async fn update_task(
        &self,
        Parameters(input): Parameters<UpdateTaskInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let update = TaskUpdate {
            title: input.title,
            description: input.description,
            status: input.status,
            priority: input.priority,
            assigned_to_user_id: input.assigned_to_user_id,
            due_date: input.due_date,
            task_type: input.task_type,
        };
        run_tool("update_task", self.service.update_task(&input.task_id, update)).await
    }

    #[tool(description = "List open tasks past their due date, oldest first, with associated deal and contact names")]
    pub async fn get_overdue_tasks(
        &self,
        Parameters(input): Parameters<OverdueTasksInput>,
    ) -> Result<CallToolResult, ErrorData> {
        run_tool(
            "get_overdue_tasks",
            self.service.get_overdue_tasks(input.owner_id.as_deref(), input.limit),
        )
        .await
    }

    #[tool(description = "List tasks for a deal given its id or name")]
    pub async fn get_tasks_for_deal(
        &self,
        Parameters(input): Parameters<TasksForDealInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let query = TasksForDeal {
            deal_id: input.deal_id,
            deal_name: input.deal_name,
            include_completed: input.include_completed,
            limit: input.limit,
        };
        run_tool("get_tasks_for_deal", self.service.get_tasks_for_deal(query)).await
    }

    #[tool(description = "List tasks for a contact given its id, name or email")]
    pub async fn get_tasks_for_contact(
        &self,
        Parameters(input): Parameters<TasksForContactInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let query = TasksForContact {
            contact_id: input.contact_id,
            contact_name: input.contact_name,
            contact_email: input.contact_email,
            include_completed: input.include_completed,
            limit: input.limit,
        };
        run_tool("get_tasks_for_contact", self.service.get_tasks_for_contact(query)).await
    }

    #[tool(description = "Get a meeting by id")]
    pub async fn get_meeting_details(
        &self,
        Parameters(input): Parameters<MeetingDetailsInput>,
    ) -> Result<CallToolResult, ErrorData> {
        run_tool(
            "get_meeting_details",
            self.service.get_meeting_details(&input.meeting_id, &input.properties),
        )
        .await
    }

    #[tool(description = "Create a meeting, optionally linked to contacts and deals")]
    pub async fn create_meeting(
        &self,
        Parameters(input): Parameters<CreateMeetingInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let meeting = NewMeeting {
            title: input.title,
            start_time: input.start_time,
            end_time: input.end_time,
            description: input.description,
            owner_id: input.owner_id,
            outcome: input.outcome,
            location: input.location,
            contact_ids: input.contact_ids,
            deal_ids: input.deal_ids,
            meeting_type: input.meeting_type,
            internal_notes: input.internal_notes,
        };
        run_tool("create_meeting", self.service.create_meeting(meeting)).await
    }

    #[tool(description = "List meetings on a deal, sorted by start time, optionally filtered by outcome or excluding automated bookings")]
    pub async fn get_deal_meetings(
        &self,
        Parameters(input): Parameters<DealMeetingsInput>,
    ) -> Result<CallToolResult, ErrorData> {
        run_tool("get_deal_meetings", async move {
            let query = DealMeetingsQuery {
                deal_id: input.deal_id,
                limit: input.limit,
                outcome_filter: input.outcome_filter,
                exclude_calendly: input.exclude_calendly,
                sort_direction: parse_direction(input.sort_direction.as_deref())?,
            };
            self.service.get_deal_meetings(query).await
        })
        .await
    }

    #[tool(description = "Search meetings whose description contains a term")]
    pub async fn search_meetings(
        &self,
        Parameters(input): Parameters<SearchMeetingsInput>,
    ) -> Result<CallToolResult, ErrorData> {
        run_tool("search_meetings", async move {
            let direction = parse_direction(input.sort_direction.as_deref())?;
            self.service.search_meetings(&input.search_term, input.limit, direction).await
        })
        .await
    }

    #[tool(description = "List notes on a deal, sorted by timestamp")]
    pub async fn get_deal_notes(
        &self,
        Parameters(input): Parameters<DealNotesInput>,
    ) -> Result<CallToolResult, ErrorData> {
        run_tool("get_deal_notes", async move {
            let direction = parse_direction(input.sort_direction.as_deref())?;
            self.service.get_deal_notes(&input.deal_id, input.limit, direction).await
        })
        .await
    }

    #[tool(description = "Search deals by name, most recently modified first")]
    pub async fn search_deals(
        &self,
        Parameters(input): Parameters<SearchDealsInput>,
    ) -> Result<CallToolResult, ErrorData> {
        run_tool("search_deals", self.service.search_deals(&input.deal_name, input.limit)).await
    }

    #[tool(description = "Search contacts by exact email or by name")]
    pub async fn search_contacts(
        &self,
        Parameters(input): Parameters<SearchContactsInput>,
    ) -> Result<CallToolResult, ErrorData> {
        run_tool(
            "search_contacts",
            self.service.search_contacts(
                input.contact_name.as_deref(),
                input.contact_email.as_deref(),
                input.limit,
            ),
        )
        .await
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Runs one operation under a correlation id and renders its outcome.
async fn run_tool<F>(tool: &'static str, operation: F) -> Result<CallToolResult, ErrorData>
where
    F: Future<Output = CrmResult<Value>>,
{
    let correlation_id = Uuid::new_v4().to_string();
    let span = info_span!("mcp.tool", tool, correlation_id = %correlation_id);

    async move {
        debug!(event_name = "mcp.tool.started", "tool invoked");
        let started = Instant::now();
        let outcome = operation.await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(value) => {
                info!(event_name = "mcp.tool.completed", elapsed_ms, "tool completed");
                success_result(&value)
            }
            Err(error) => {
                warn!(
                    event_name = "mcp.tool.failed",
                    category = %error.kind,
                    status_code = ?error.status,
                    elapsed_ms,
                    error = %error.message,
                    "tool failed"
                );
                error_result(&error)
            }
        }
    }
    .instrument(span)
    .await
}

fn success_result(value: &Value) -> Result<CallToolResult, ErrorData> {
    let content = serde_json::to_string_pretty(value).map_err(McpServerError::from)?;
    Ok(CallToolResult::success(vec![Content::text(content)]))
}

fn error_result(error: &CrmError) -> Result<CallToolResult, ErrorData> {
    let content = serde_json::to_string_pretty(&error.to_payload()).map_err(McpServerError::from)?;
    Ok(CallToolResult::error(vec![Content::text(content)]))
}

fn parse_direction(raw: Option<&str>) -> CrmResult<SortDirection> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => value.parse(),
        None => Ok(SortDirection::default()),
    }
}

fn default_100() -> u32 {
    100
}

fn default_10() -> u32 {
    10
}
