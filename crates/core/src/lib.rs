pub mod associations;
pub mod client;
pub mod config;
pub mod crm;
pub mod document;
pub mod domain;
pub mod errors;
pub mod query;
pub mod time;
pub mod transport;

pub use associations::{AssociationResolver, HydrationRequest};
pub use client::{HubSpotClient, RetryPolicy};
pub use config::{AppConfig, ConfigError, ConfigOverrides, HubSpotConfig, LoadOptions, LogFormat};
pub use crm::{
    DealMeetingsQuery, HubSpotService, NewMeeting, NewTask, TaskCompletion, TaskSearch, TaskUpdate,
    TasksForContact, TasksForDeal,
};
pub use domain::{ObjectType, OverdueStatus, TaskAssociations};
pub use errors::{CrmError, CrmResult, ErrorKind};
pub use query::{Filter, FilterOperator, SearchRequest, Sort, SortDirection, TaskQuery};
pub use time::{Clock, FixedClock, SystemClock};
pub use transport::{
    ApiRequest, ApiResponse, HttpMethod, HttpTransport, ReqwestTransport, ScriptedReply,
    ScriptedTransport, TransportError,
};
