//! Read-mostly helper views behind the dashboard endpoints.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime};
use futures::future::{join_all, try_join_all};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::str::FromStr;
use tracing::debug;

use crate::agent::date_context::DateContext;
use crate::agent::dispatch::email::list_inbox;
use crate::agent::intent::DEFAULT_TASKLIST;
use crate::agent::normalize::at_local;
use crate::google::{
    CalendarApi, EventResource, EventWindow, MailApi, MailboxRow, MessageSummary, RemoteClients,
    RemoteError, TaskFilter, TaskResource, TasksApi,
};

/// Days covered by the overview and the "upcoming" task bucket.
pub const UPCOMING_DAYS: i64 = 7;

pub const INBOX_PAGE_SIZE: u32 = 25;
const LAST_WEEK_LIMIT: u32 = 50;

static ACTION_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"due|deadline|submit|assign").unwrap());
static EVENT_WORDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"meeting|invite|join|meet").unwrap());
static ATTACHMENT_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"attachment|file|report").unwrap());

/// Incomplete tasks grouped by due date relative to today.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBuckets {
    /// Overdue.
    pub pending: Vec<TaskResource>,
    /// Due today.
    pub ongoing: Vec<TaskResource>,
    /// Due within the next week.
    pub upcoming: Vec<TaskResource>,
    pub no_due_date: Vec<TaskResource>,
}

impl TaskBuckets {
    /// Sort tasks into buckets. Tasks due beyond the upcoming week are left out.
    pub fn sort(tasks: Vec<TaskResource>, today: NaiveDate) -> Self {
        let horizon = today + Duration::days(UPCOMING_DAYS);
        let mut buckets = Self::default();

        for task in tasks {
            let Some(due) = task.due else {
                buckets.no_due_date.push(task);
                continue;
            };
            // Tasks carries due dates as midnight timestamps; only the date counts
            let due = due.date_naive();
            if due < today {
                buckets.pending.push(task);
            } else if due == today {
                buckets.ongoing.push(task);
            } else if due <= horizon {
                buckets.upcoming.push(task);
            }
        }
        buckets
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub events: Vec<EventResource>,
    pub tasks: TaskBuckets,
}

/// Events on one local calendar day.
pub async fn events_on(
    api: &dyn CalendarApi,
    date: NaiveDate,
    offset: FixedOffset,
) -> Result<Vec<EventResource>, RemoteError> {
    let (start, end) = day_bounds(date, offset)?;
    api.list_events(&EventWindow::between(start, end)).await
}

pub async fn events_between(
    api: &dyn CalendarApi,
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
) -> Result<Vec<EventResource>, RemoteError> {
    api.list_events(&EventWindow::between(start, end)).await
}

/// Incomplete tasks from every list, tagged with their list's name.
pub async fn all_open_tasks(api: &dyn TasksApi) -> Result<Vec<TaskResource>, RemoteError> {
    let lists = api.list_tasklists().await?;
    debug!(lists = lists.len(), "Collecting open tasks");

    let per_list = try_join_all(lists.iter().map(|list| async move {
        let tasks = api.list_tasks(&list.id, &TaskFilter::incomplete()).await?;
        Ok::<_, RemoteError>(
            tasks
                .into_iter()
                .map(|task| TaskResource {
                    tasklist_name: Some(list.title.clone()),
                    ..task
                })
                .collect::<Vec<_>>(),
        )
    }))
    .await?;

    Ok(per_list.into_iter().flatten().collect())
}

pub async fn task_buckets(api: &dyn TasksApi, ctx: &DateContext) -> Result<TaskBuckets, RemoteError> {
    let tasks = all_open_tasks(api).await?;
    Ok(TaskBuckets::sort(tasks, ctx.anchor_date))
}

/// The next week of events and the bucketed tasks, fetched concurrently.
pub async fn overview(clients: &RemoteClients, ctx: &DateContext) -> Result<Overview, RemoteError> {
    let week = ctx.now + Duration::days(UPCOMING_DAYS);
    let (events, tasks) = tokio::join!(
        events_between(clients.calendar.as_ref(), ctx.now, week),
        task_buckets(clients.tasks.as_ref(), ctx),
    );
    Ok(Overview {
        events: events?,
        tasks: tasks?,
    })
}

/// Mark a task in the default list as completed.
pub async fn complete_task(api: &dyn TasksApi, task_id: &str) -> Result<TaskResource, RemoteError> {
    let patch = TaskResource {
        status: Some("completed".to_string()),
        ..TaskResource::default()
    };
    api.patch_task(DEFAULT_TASKLIST, task_id, &patch).await
}

pub async fn delete_task(api: &dyn TasksApi, task_id: &str) -> Result<(), RemoteError> {
    api.delete_task(DEFAULT_TASKLIST, task_id).await
}

// ============================================================================
// EMAIL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightKind {
    Action,
    Event,
    Attachment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Highlight {
    #[serde(rename = "type")]
    pub kind: HighlightKind,
    pub text: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighlightedEmail {
    #[serde(flatten)]
    pub email: MessageSummary,
    pub highlights: Vec<Highlight>,
}

/// Keyword tags for an inbox row, matched against subject and snippet.
pub fn highlights(subject: &str, snippet: &str) -> Vec<Highlight> {
    let text = format!("{} {}", subject, snippet).to_lowercase();
    [
        (&*ACTION_WORDS, HighlightKind::Action, "Action required"),
        (&*EVENT_WORDS, HighlightKind::Event, "Meeting / Event"),
        (&*ATTACHMENT_WORDS, HighlightKind::Attachment, "Has attachments"),
    ]
    .into_iter()
    .filter(|(words, _, _)| words.is_match(&text))
    .map(|(_, kind, text)| Highlight { kind, text })
    .collect()
}

/// Inbox rows matching `query`, each tagged with its highlights.
pub async fn inbox(
    api: &dyn MailApi,
    query: &str,
    max_results: u32,
) -> Result<Vec<HighlightedEmail>, RemoteError> {
    let emails = list_inbox(api, query.trim(), max_results.clamp(1, 100)).await?;
    Ok(emails
        .into_iter()
        .map(|email| HighlightedEmail {
            highlights: highlights(&email.subject, &email.snippet),
            email,
        })
        .collect())
}

/// Primary-tab mail from the last seven days. Messages that fail to load are skipped.
pub async fn last_week_emails(
    api: &dyn MailApi,
    ctx: &DateContext,
) -> Result<Vec<MailboxRow>, RemoteError> {
    let since = ctx.now - Duration::days(UPCOMING_DAYS);
    let query = format!(
        "category:primary after:{} before:{}",
        since.timestamp(),
        ctx.now.timestamp()
    );
    let ids = api.list_message_ids(&query, &[], LAST_WEEK_LIMIT).await?;

    let loaded = join_all(ids.iter().map(|id| api.get_message(id))).await;
    Ok(ids
        .iter()
        .zip(loaded)
        .filter_map(|(id, detail)| match detail {
            Ok(detail) => Some(MailboxRow::from_detail(&detail)),
            Err(e) => {
                debug!(message_id = %id, error = %e, "Skipping message");
                None
            }
        })
        .collect())
}

/// Dashboard mailbox action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailAction {
    Read,
    Unread,
    Archive,
    Delete,
}

impl FromStr for MailAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "read" => Ok(Self::Read),
            "unread" => Ok(Self::Unread),
            "archive" => Ok(Self::Archive),
            "delete" => Ok(Self::Delete),
            other => Err(format!("Invalid action: {}", other)),
        }
    }
}

impl MailAction {
    pub fn done_message(self) -> &'static str {
        match self {
            Self::Read => "Email marked as read",
            Self::Unread => "Email marked as unread",
            Self::Archive => "Email archived",
            Self::Delete => "Email moved to trash",
        }
    }
}

/// Apply `action` to one message. Delete moves to trash.
pub async fn apply_mail_action(
    api: &dyn MailApi,
    message_id: &str,
    action: MailAction,
) -> Result<(), RemoteError> {
    match action {
        MailAction::Read => api.modify_labels(message_id, &[], &["UNREAD"]).await,
        MailAction::Unread => api.modify_labels(message_id, &["UNREAD"], &[]).await,
        MailAction::Archive => api.modify_labels(message_id, &[], &["INBOX"]).await,
        MailAction::Delete => api.trash_message(message_id).await,
    }
}

/// Parse a range bound: RFC 3339, or a bare date taken as the start of that
/// day (or, for an end bound, the start of the next one).
pub fn parse_bound(text: &str, offset: FixedOffset, is_end: bool) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&offset));
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    let date = if is_end { date.succ_opt()? } else { date };
    at_local(date, NaiveTime::MIN, offset)
}

fn day_bounds(
    date: NaiveDate,
    offset: FixedOffset,
) -> Result<(DateTime<FixedOffset>, DateTime<FixedOffset>), RemoteError> {
    let start = at_local(date, NaiveTime::MIN, offset);
    let end = date
        .succ_opt()
        .and_then(|next| at_local(next, NaiveTime::MIN, offset));
    match (start, end) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(RemoteError::Decode(format!("date {} is out of range", date))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::TaskList;
    use crate::google::MessageDetail;
    use crate::google::tests::{FakeCalendar, FakeMail, FakeTasks, clients, task};
    use serde_json::json;
    use std::sync::Arc;

    fn ctx() -> DateContext {
        DateContext::resolve(DateTime::parse_from_rfc3339("2024-06-10T10:00:00+05:30").unwrap())
    }

    fn due(id: &str, date: &str) -> TaskResource {
        TaskResource {
            due: Some(DateTime::parse_from_rfc3339(&format!("{}T00:00:00Z", date)).unwrap()),
            ..task(id, id)
        }
    }

    fn ids(tasks: &[TaskResource]) -> Vec<&str> {
        tasks.iter().filter_map(|t| t.id.as_deref()).collect()
    }

    #[test]
    fn buckets_follow_due_date() {
        let tasks = vec![
            due("late", "2024-06-09"),
            due("today", "2024-06-10"),
            due("soon", "2024-06-11"),
            due("week", "2024-06-17"),
            due("later", "2024-06-18"),
            task("whenever", "whenever"),
        ];

        let buckets = TaskBuckets::sort(tasks, ctx().anchor_date);
        assert_eq!(ids(&buckets.pending), vec!["late"]);
        assert_eq!(ids(&buckets.ongoing), vec!["today"]);
        assert_eq!(ids(&buckets.upcoming), vec!["soon", "week"]);
        assert_eq!(ids(&buckets.no_due_date), vec!["whenever"]);
    }

    #[test]
    fn buckets_serialize_camel_case() {
        let value = serde_json::to_value(TaskBuckets::default()).unwrap();
        assert!(value.get("noDueDate").is_some());
    }

    #[tokio::test]
    async fn open_tasks_carry_list_names() {
        let mut api = FakeTasks::default();
        api.lists = vec![
            TaskList {
                id: "a".into(),
                title: "Work".into(),
            },
            TaskList {
                id: "b".into(),
                title: "Home".into(),
            },
        ];
        let mut done = task("t3", "Done already");
        done.status = Some("completed".into());
        {
            let mut stored = api.tasks.lock().unwrap();
            stored.insert("a".into(), vec![task("t1", "Report"), done]);
            stored.insert("b".into(), vec![task("t2", "Laundry")]);
        }

        let tasks = all_open_tasks(&api).await.unwrap();
        let names: Vec<_> = tasks
            .iter()
            .map(|t| (t.id.as_deref().unwrap(), t.tasklist_name.as_deref().unwrap()))
            .collect();
        assert_eq!(names, vec![("t1", "Work"), ("t2", "Home")]);
        assert!(
            api.filters
                .lock()
                .unwrap()
                .iter()
                .all(|f| *f == TaskFilter::incomplete())
        );
    }

    #[tokio::test]
    async fn day_view_covers_local_midnight_to_midnight() {
        let api = FakeCalendar::default();
        let date = NaiveDate::from_ymd_opt(2024, 6, 11).unwrap();
        events_on(&api, date, ctx().offset()).await.unwrap();

        let window = api.windows.lock().unwrap()[0].clone();
        assert_eq!(
            window.time_min.unwrap().to_rfc3339(),
            "2024-06-11T00:00:00+05:30"
        );
        assert_eq!(
            window.time_max.unwrap().to_rfc3339(),
            "2024-06-12T00:00:00+05:30"
        );
    }

    #[tokio::test]
    async fn overview_reads_a_week_of_events() {
        let calendar = Arc::new(FakeCalendar::default());
        let remote = clients(calendar.clone(), Arc::default(), Arc::default());

        let view = overview(&remote, &ctx()).await.unwrap();
        assert!(view.events.is_empty());
        assert_eq!(view.tasks, TaskBuckets::default());

        let window = calendar.windows.lock().unwrap()[0].clone();
        assert_eq!(window.time_min, Some(ctx().now));
        assert_eq!(
            window.time_max.unwrap().to_rfc3339(),
            "2024-06-17T10:00:00+05:30"
        );
    }

    #[test]
    fn range_bounds_accept_dates_and_instants() {
        let offset = ctx().offset();
        assert_eq!(
            parse_bound("2024-06-11", offset, true).unwrap().to_rfc3339(),
            "2024-06-12T00:00:00+05:30"
        );
        assert_eq!(
            parse_bound("2024-06-11T00:00:00Z", offset, false)
                .unwrap()
                .to_rfc3339(),
            "2024-06-11T05:30:00+05:30"
        );
        assert_eq!(parse_bound("soonish", offset, false), None);
    }

    fn mail(id: &str, subject: &str, snippet: &str, labels: &[&str]) -> MessageDetail {
        serde_json::from_value(json!({
            "id": id,
            "threadId": format!("t-{}", id),
            "snippet": snippet,
            "labelIds": labels,
            "payload": { "headers": [{ "name": "Subject", "value": subject }] }
        }))
        .unwrap()
    }

    #[test]
    fn highlights_tag_keywords() {
        let tags = highlights("Assignment due Friday", "Please join the meeting and read the report");
        let kinds: Vec<HighlightKind> = tags.iter().map(|h| h.kind).collect();
        assert_eq!(
            kinds,
            vec![HighlightKind::Action, HighlightKind::Event, HighlightKind::Attachment]
        );
        assert!(highlights("Lunch?", "Sandwiches at noon").is_empty());

        let value = serde_json::to_value(&tags[0]).unwrap();
        assert_eq!(value, json!({ "type": "action", "text": "Action required" }));
    }

    #[tokio::test]
    async fn inbox_rows_carry_highlights() {
        let api = FakeMail::with_messages(vec![
            mail("m1", "Team meeting", "see you there", &["INBOX"]),
            mail("m2", "Hello", "just saying hi", &["INBOX"]),
        ]);

        let rows = inbox(&api, " is:unread ", 500).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].highlights[0].kind, HighlightKind::Event);
        assert!(rows[1].highlights.is_empty());

        let value = serde_json::to_value(&rows[0]).unwrap();
        assert_eq!(value["id"], "m1");
        assert_eq!(value["highlights"][0]["type"], "event");

        let (query, labels, max) = api.queries.lock().unwrap()[0].clone();
        assert_eq!(query, "is:unread");
        assert_eq!(labels, vec!["INBOX".to_string()]);
        assert_eq!(max, 100);
    }

    #[tokio::test]
    async fn last_week_queries_primary_window_and_skips_broken() {
        let mut api = FakeMail::with_messages(vec![
            mail("m1", "Report", "", &["INBOX", "UNREAD", "STARRED"]),
            mail("m2", "Gone", "", &["INBOX"]),
        ]);
        api.broken.insert("m2".into());

        let rows = last_week_emails(&api, &ctx()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].unread && rows[0].starred);
        assert_eq!(rows[0].thread_id, "t-m1");

        let (query, labels, max) = api.queries.lock().unwrap()[0].clone();
        let now = ctx().now.timestamp();
        assert_eq!(
            query,
            format!("category:primary after:{} before:{}", now - 7 * 86_400, now)
        );
        assert!(labels.is_empty());
        assert_eq!(max, 50);
    }

    #[tokio::test]
    async fn mail_actions_map_to_label_changes() {
        let api = FakeMail::with_messages(vec![mail("m1", "x", "", &["INBOX", "UNREAD"])]);

        for action in ["read", "Unread", "archive"] {
            let action: MailAction = action.parse().unwrap();
            apply_mail_action(&api, "m1", action).await.unwrap();
        }
        apply_mail_action(&api, "m1", MailAction::Delete).await.unwrap();

        let modified = api.modified.lock().unwrap().clone();
        let s = |v: &[&str]| v.iter().map(|l| l.to_string()).collect::<Vec<_>>();
        assert_eq!(
            modified,
            vec![
                ("m1".to_string(), s(&[]), s(&["UNREAD"])),
                ("m1".to_string(), s(&["UNREAD"]), s(&[])),
                ("m1".to_string(), s(&[]), s(&["INBOX"])),
            ]
        );
        assert_eq!(*api.trashed.lock().unwrap(), vec!["m1".to_string()]);
        assert!("star".parse::<MailAction>().is_err());
    }
}
