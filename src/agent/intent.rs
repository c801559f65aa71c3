use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DEFAULT_TASKLIST: &str = "@default";
pub const DEFAULT_EVENT_TITLE: &str = "Untitled Event";
pub const DEFAULT_DURATION_MINUTES: u32 = 60;
pub const DEFAULT_MAX_RESULTS: u32 = 10;
pub const DEFAULT_EMAIL_QUERY: &str = "in:inbox";

/// Calendar color ids for the categories the calendar prompt allows.
pub const CATEGORY_COLORS: &[(&str, &str)] = &[
    ("Work", "5"),
    ("Meeting", "7"),
    ("Study", "10"),
    ("Personal", "9"),
    ("Call", "11"),
    ("Reminder", "2"),
    ("Errand", "4"),
    ("Project", "6"),
];

/// Look up a category's color id, ignoring case. Unknown categories have no color.
pub fn color_for_category(category: &str) -> Option<&'static str> {
    let category = category.trim();
    CATEGORY_COLORS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(category))
        .map(|(_, color)| *color)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Calendar,
    Email,
    Tasks,
}

impl Domain {
    /// Action tags the oracle may use for this domain.
    pub fn actions(self) -> &'static [&'static str] {
        match self {
            Domain::Calendar => &["add_event", "update_event", "delete_event", "fetch_events"],
            Domain::Email => &[
                "send_email",
                "get_email",
                "delete_email",
                "fetch_emails",
                "search_emails",
            ],
            Domain::Tasks => &["create", "update", "delete", "list"],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Calendar => "calendar",
            Domain::Email => "email",
            Domain::Tasks => "tasks",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "calendar" => Ok(Domain::Calendar),
            "email" | "gmail" => Ok(Domain::Email),
            "tasks" | "task" => Ok(Domain::Tasks),
            other => Err(format!("unknown domain: {}", other)),
        }
    }
}

/// An intent with every date resolved and every optional field explicit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NormalizedIntent {
    Calendar(CalendarIntent),
    Email(EmailIntent),
    Tasks(TaskIntent),
}

impl NormalizedIntent {
    pub fn domain(&self) -> Domain {
        match self {
            NormalizedIntent::Calendar(_) => Domain::Calendar,
            NormalizedIntent::Email(_) => Domain::Email,
            NormalizedIntent::Tasks(_) => Domain::Tasks,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            NormalizedIntent::Calendar(intent) => match intent {
                CalendarIntent::AddEvent(_) => "add_event",
                CalendarIntent::UpdateEvent(_) => "update_event",
                CalendarIntent::DeleteEvent(_) => "delete_event",
                CalendarIntent::FetchEvents(_) => "fetch_events",
            },
            NormalizedIntent::Email(intent) => match intent {
                EmailIntent::SendEmail(_) => "send_email",
                EmailIntent::GetEmail(_) => "get_email",
                EmailIntent::DeleteEmail(_) => "delete_email",
                EmailIntent::FetchEmails(_) => "fetch_emails",
                EmailIntent::SearchEmails(_) => "search_emails",
            },
            NormalizedIntent::Tasks(intent) => match intent {
                TaskIntent::Create(_) => "create",
                TaskIntent::Update(_) => "update",
                TaskIntent::Delete(_) => "delete",
                TaskIntent::List(_) => "list",
            },
        }
    }
}

// ============================================================================
// CALENDAR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CalendarIntent {
    AddEvent(NewEvent),
    UpdateEvent(EventUpdate),
    DeleteEvent(EventTarget),
    FetchEvents(EventQuery),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewEvent {
    pub title: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub duration_minutes: u32,
    pub start: DateTime<FixedOffset>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub attendees: Vec<String>,
    pub category: Option<String>,
    #[serde(rename = "colorId")]
    pub color_id: Option<String>,
}

impl NewEvent {
    pub fn end(&self) -> DateTime<FixedOffset> {
        self.start + Duration::minutes(i64::from(self.duration_minutes))
    }
}

/// How an existing event is located: id first, then title substring.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct EventTarget {
    pub event_id: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventUpdate {
    pub target: EventTarget,
    pub new_title: Option<String>,
    pub new_date: Option<NaiveDate>,
    #[serde(with = "opt_hhmm")]
    pub new_time: Option<NaiveTime>,
    pub new_duration_minutes: Option<u32>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub attendees: Vec<String>,
    pub category: Option<String>,
    #[serde(rename = "colorId")]
    pub color_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct EventQuery {
    pub title: Option<String>,
    pub query: Option<String>,
    pub date: Option<NaiveDate>,
    /// 1-based month number
    pub month: Option<u32>,
    pub year: Option<i32>,
    #[serde(rename = "timeMin")]
    pub time_min: Option<DateTime<FixedOffset>>,
    #[serde(rename = "timeMax")]
    pub time_max: Option<DateTime<FixedOffset>>,
    pub deadline: Option<DateTime<FixedOffset>>,
    pub category: Option<String>,
    #[serde(rename = "colorId")]
    pub color_id: Option<String>,
}

// ============================================================================
// EMAIL
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EmailIntent {
    SendEmail(OutgoingEmail),
    GetEmail(MessageRef),
    DeleteEmail(MessageRef),
    FetchEmails(EmailQuery),
    SearchEmails(EmailSearch),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MessageRef {
    #[serde(rename = "messageId")]
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailQuery {
    pub query: String,
    #[serde(rename = "maxResults")]
    pub max_results: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailSearch {
    pub unread: bool,
    pub from: Option<String>,
    pub subject: Option<String>,
    pub keyword: Option<String>,
    pub after: Option<NaiveDate>,
    pub before: Option<NaiveDate>,
    #[serde(rename = "maxResults")]
    pub max_results: u32,
}

impl EmailSearch {
    /// Compile the filter into Gmail search syntax.
    pub fn to_query(&self) -> String {
        let mut q = String::new();
        if self.unread {
            q.push_str("is:unread ");
        }
        if let Some(from) = &self.from {
            q.push_str(&format!("from:{} ", from));
        }
        if let Some(subject) = &self.subject {
            q.push_str(&format!("subject:{} ", subject));
        }
        if let Some(keyword) = &self.keyword {
            q.push_str(&format!("{} ", keyword));
        }
        if let Some(after) = self.after {
            q.push_str(&format!("after:{} ", after.format("%Y/%m/%d")));
        }
        if let Some(before) = self.before {
            q.push_str(&format!("before:{} ", before.format("%Y/%m/%d")));
        }
        q.trim().to_string()
    }
}

// ============================================================================
// TASKS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TaskIntent {
    Create(NewTask),
    Update(TaskUpdate),
    Delete(TaskTarget),
    List(TaskListing),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    #[default]
    NeedsAction,
    Completed,
}

impl TaskStatus {
    /// Wire value used by the Tasks API.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::NeedsAction => "needsAction",
            TaskStatus::Completed => "completed",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "needsaction" | "needs_action" | "pending" | "open" => Ok(TaskStatus::NeedsAction),
            "completed" | "complete" | "done" => Ok(TaskStatus::Completed),
            other => Err(format!("unknown task status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTask {
    #[serde(rename = "tasklistId")]
    pub tasklist_id: String,
    pub title: String,
    pub notes: String,
    pub due: Option<DateTime<FixedOffset>>,
    pub status: TaskStatus,
    pub subtasks: Vec<SubtaskDraft>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubtaskDraft {
    pub title: String,
    pub notes: String,
}

/// Locates a task by id, or by exact (case-insensitive) title.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskTarget {
    #[serde(rename = "tasklistId")]
    pub tasklist_id: String,
    #[serde(rename = "taskId")]
    pub task_id: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub notes: Option<String>,
    pub due: Option<DateTime<FixedOffset>>,
    pub status: Option<TaskStatus>,
}

impl TaskChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.notes.is_none() && self.due.is_none() && self.status.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskUpdate {
    pub target: TaskTarget,
    pub changes: TaskChanges,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskListing {
    #[serde(rename = "tasklistId")]
    pub tasklist_id: String,
    pub filter: Option<String>,
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.format("%H:%M").to_string())
    }
}

mod opt_hhmm {
    use chrono::NaiveTime;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(time: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
        match time {
            Some(t) => s.serialize_str(&t.format("%H:%M").to_string()),
            None => s.serialize_none(),
        }
    }
}
