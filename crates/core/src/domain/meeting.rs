use serde_json::Value;

use crate::document::property_or_empty;
use crate::query::{Sort, SortDirection};
use crate::time::parse_timestamp_ms;

pub const PROP_TITLE: &str = "hs_meeting_title";
pub const PROP_BODY: &str = "hs_meeting_body";
pub const PROP_START_TIME: &str = "hs_meeting_start_time";
pub const PROP_END_TIME: &str = "hs_meeting_end_time";
pub const PROP_OUTCOME: &str = "hs_meeting_outcome";
pub const PROP_LOCATION: &str = "hs_meeting_location";
pub const PROP_EXTERNAL_URL: &str = "hs_meeting_external_url";
pub const PROP_ACTIVITY_TYPE: &str = "hs_activity_type";
pub const PROP_INTERNAL_NOTES: &str = "hs_internal_meeting_notes";

pub const MEETING_PROPERTIES: &[&str] = &[
    PROP_TITLE,
    PROP_BODY,
    PROP_START_TIME,
    PROP_END_TIME,
    PROP_OUTCOME,
    PROP_LOCATION,
    PROP_EXTERNAL_URL,
    PROP_ACTIVITY_TYPE,
    "hs_timestamp",
    "hs_createdate",
    "hs_lastmodifieddate",
    "hubspot_owner_id",
];

pub const SEARCH_MEETING_PROPERTIES: &[&str] = &[
    PROP_TITLE,
    PROP_BODY,
    PROP_START_TIME,
    PROP_END_TIME,
    PROP_OUTCOME,
    PROP_LOCATION,
    "hs_timestamp",
    "hubspot_owner_id",
];

const CALENDLY_TITLE_PATTERNS: &[&str] = &[
    "calendly",
    "quick call",
    "discovery call",
    "15 minute",
    "30 minute",
    "book a time",
    "schedule a call",
];

const AUTOMATED_LOCATION_PATTERNS: &[&str] = &["calendly", "automated", "zoom.us/j/"];

/// Heuristic: does this meeting look like it came from an automated booking tool?
///
/// Matches are case-insensitive substrings on the external URL, title, and
/// location. False positives are expected (e.g. a hand-booked "Discovery call").
pub fn is_calendly_meeting(meeting: &Value) -> bool {
    let external_url = property_or_empty(meeting, PROP_EXTERNAL_URL).to_lowercase();
    if external_url.contains("calendly.com") {
        return true;
    }

    let title = property_or_empty(meeting, PROP_TITLE).to_lowercase();
    if CALENDLY_TITLE_PATTERNS.iter().any(|pattern| title.contains(pattern)) {
        return true;
    }

    let location = property_or_empty(meeting, PROP_LOCATION).to_lowercase();
    AUTOMATED_LOCATION_PATTERNS.iter().any(|pattern| location.contains(pattern))
}

/// Start time in epoch ms; absent or unparseable sorts as 0.
pub fn start_time_ms(meeting: &Value) -> i64 {
    parse_timestamp_ms(property_or_empty(meeting, PROP_START_TIME)).unwrap_or(0)
}

/// Stable sort by start time; DESCENDING puts the most recent first.
pub fn sort_by_start_time(meetings: &mut [Value], direction: SortDirection) {
    Sort::new(PROP_START_TIME, direction).apply(meetings);
}
