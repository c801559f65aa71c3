//! Google Calendar, Gmail and Tasks REST clients.
//!
//! Each API sits behind a trait so the dispatchers can run against in-memory
//! fakes. The reqwest implementations are built fresh for every request from
//! the caller's OAuth access token.

pub mod calendar;
pub mod gmail;
pub mod tasks;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ErrorKind;

pub use calendar::{Attendee, EventResource, EventTime, EventWindow, GoogleCalendar, Reminders};
pub use gmail::{GoogleMail, MailboxRow, MessageDetail, MessageSummary, SentMessage};
pub use tasks::{GoogleTasks, TaskFilter, TaskList, TaskResource};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("access token expired or revoked")]
    Unauthorized,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("invalid resource id: {0:?}")]
    InvalidId(String),
}

impl RemoteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RemoteError::Unauthorized => ErrorKind::RemoteUnavailable,
            RemoteError::NotFound(_) => ErrorKind::NotFound,
            RemoteError::InvalidId(_) => ErrorKind::ValidationFailed,
            RemoteError::Api { .. } | RemoteError::Http(_) | RemoteError::Decode(_) => {
                ErrorKind::RemoteRejected
            }
        }
    }
}

#[async_trait]
pub trait CalendarApi: Send + Sync {
    async fn list_events(&self, window: &EventWindow) -> Result<Vec<EventResource>, RemoteError>;
    async fn get_event(&self, event_id: &str) -> Result<EventResource, RemoteError>;
    async fn insert_event(&self, event: &EventResource) -> Result<EventResource, RemoteError>;
    async fn update_event(
        &self,
        event_id: &str,
        event: &EventResource,
    ) -> Result<EventResource, RemoteError>;
    async fn delete_event(&self, event_id: &str) -> Result<(), RemoteError>;
}

#[async_trait]
pub trait MailApi: Send + Sync {
    /// Message ids matching `query`, restricted to `label_ids` when non-empty.
    async fn list_message_ids(
        &self,
        query: &str,
        label_ids: &[&str],
        max_results: u32,
    ) -> Result<Vec<String>, RemoteError>;
    async fn get_message(&self, message_id: &str) -> Result<MessageDetail, RemoteError>;
    /// Send a base64url-encoded RFC 2822 message.
    async fn send_raw(&self, raw: &str) -> Result<SentMessage, RemoteError>;
    async fn trash_message(&self, message_id: &str) -> Result<(), RemoteError>;
    async fn modify_labels(
        &self,
        message_id: &str,
        add: &[&str],
        remove: &[&str],
    ) -> Result<(), RemoteError>;
}

#[async_trait]
pub trait TasksApi: Send + Sync {
    async fn list_tasklists(&self) -> Result<Vec<TaskList>, RemoteError>;
    async fn list_tasks(
        &self,
        tasklist_id: &str,
        filter: &TaskFilter,
    ) -> Result<Vec<TaskResource>, RemoteError>;
    async fn insert_task(
        &self,
        tasklist_id: &str,
        task: &TaskResource,
        parent: Option<&str>,
    ) -> Result<TaskResource, RemoteError>;
    async fn patch_task(
        &self,
        tasklist_id: &str,
        task_id: &str,
        patch: &TaskResource,
    ) -> Result<TaskResource, RemoteError>;
    async fn delete_task(&self, tasklist_id: &str, task_id: &str) -> Result<(), RemoteError>;
}

/// The three remote services for one request.
#[derive(Clone)]
pub struct RemoteClients {
    pub calendar: Arc<dyn CalendarApi>,
    pub mail: Arc<dyn MailApi>,
    pub tasks: Arc<dyn TasksApi>,
}

/// Builds per-request clients from a user's access token.
pub trait ClientFactory: Send + Sync {
    fn for_token(&self, access_token: &str) -> RemoteClients;
}

#[derive(Debug, Clone)]
pub struct GoogleClientFactory {
    calendar_base: String,
    gmail_base: String,
    tasks_base: String,
}

impl Default for GoogleClientFactory {
    fn default() -> Self {
        Self {
            calendar_base: calendar::CALENDAR_API_BASE.to_string(),
            gmail_base: gmail::GMAIL_API_BASE.to_string(),
            tasks_base: tasks::TASKS_API_BASE.to_string(),
        }
    }
}

impl GoogleClientFactory {
    /// Route every API to one host, e.g. a mock server.
    pub fn with_base_url(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/');
        Self {
            calendar_base: format!("{}/calendar/v3", base_url),
            gmail_base: format!("{}/gmail/v1", base_url),
            tasks_base: format!("{}/tasks/v1", base_url),
        }
    }
}

impl ClientFactory for GoogleClientFactory {
    fn for_token(&self, access_token: &str) -> RemoteClients {
        RemoteClients {
            calendar: Arc::new(
                GoogleCalendar::new(access_token).with_base_url(self.calendar_base.clone()),
            ),
            mail: Arc::new(GoogleMail::new(access_token).with_base_url(self.gmail_base.clone())),
            tasks: Arc::new(GoogleTasks::new(access_token).with_base_url(self.tasks_base.clone())),
        }
    }
}

pub(crate) fn http_client() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|_| Client::new())
}

#[derive(Deserialize)]
struct GoogleErrorBody {
    error: GoogleErrorDetail,
}

#[derive(Deserialize)]
struct GoogleErrorDetail {
    #[serde(default)]
    message: String,
}

/// True when `id` can stand as exactly one URL path segment.
pub fn is_path_segment(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains(['/', '\\'])
}

/// `base` extended by `segments`, each percent-encoded as one path segment.
pub(crate) fn endpoint(base: &str, segments: &[&str]) -> Result<Url, RemoteError> {
    if let Some(bad) = segments.iter().find(|s| !is_path_segment(s)) {
        return Err(RemoteError::InvalidId(bad.to_string()));
    }
    let mut url =
        Url::parse(base).map_err(|e| RemoteError::Decode(format!("base url {}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| RemoteError::Decode(format!("base url {} has no path", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Pass successful responses through; turn everything else into a `RemoteError`.
pub(crate) async fn check_status(response: Response, what: &str) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    let message = serde_json::from_str::<GoogleErrorBody>(&body)
        .map(|parsed| parsed.error.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or(body);

    Err(match status {
        StatusCode::UNAUTHORIZED => RemoteError::Unauthorized,
        StatusCode::NOT_FOUND | StatusCode::GONE => RemoteError::NotFound(what.to_string()),
        other => RemoteError::Api {
            status: other.as_u16(),
            message,
        },
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// In-memory calendar that records every call.
    #[derive(Default)]
    pub(crate) struct FakeCalendar {
        pub(crate) events: Mutex<Vec<EventResource>>,
        pub(crate) windows: Mutex<Vec<EventWindow>>,
        pub(crate) fetched: Mutex<Vec<String>>,
        pub(crate) deleted: Mutex<Vec<String>>,
        pub(crate) updated: Mutex<Vec<(String, EventResource)>>,
        pub(crate) reject_writes: bool,
    }

    impl FakeCalendar {
        pub(crate) fn with_events(events: Vec<EventResource>) -> Self {
            Self {
                events: Mutex::new(events),
                ..Self::default()
            }
        }

        pub(crate) fn rejecting() -> Self {
            Self {
                reject_writes: true,
                ..Self::default()
            }
        }

        fn rejection() -> RemoteError {
            RemoteError::Api {
                status: 400,
                message: "Invalid resource".into(),
            }
        }
    }

    #[async_trait]
    impl CalendarApi for FakeCalendar {
        async fn list_events(&self, window: &EventWindow) -> Result<Vec<EventResource>, RemoteError> {
            self.windows.lock().unwrap().push(window.clone());
            Ok(self.events.lock().unwrap().clone())
        }

        async fn get_event(&self, event_id: &str) -> Result<EventResource, RemoteError> {
            self.fetched.lock().unwrap().push(event_id.to_string());
            self.events
                .lock()
                .unwrap()
                .iter()
                .find(|e| e.id.as_deref() == Some(event_id))
                .cloned()
                .ok_or_else(|| RemoteError::NotFound(format!("event {}", event_id)))
        }

        async fn insert_event(&self, event: &EventResource) -> Result<EventResource, RemoteError> {
            if self.reject_writes {
                return Err(Self::rejection());
            }
            let mut events = self.events.lock().unwrap();
            let id = format!("evt-{}", events.len() + 1);
            let created = EventResource {
                id: Some(id.clone()),
                html_link: Some(format!("https://calendar.google.com/event?eid={}", id)),
                ..event.clone()
            };
            events.push(created.clone());
            Ok(created)
        }

        async fn update_event(
            &self,
            event_id: &str,
            event: &EventResource,
        ) -> Result<EventResource, RemoteError> {
            if self.reject_writes {
                return Err(Self::rejection());
            }
            let mut events = self.events.lock().unwrap();
            let slot = events
                .iter_mut()
                .find(|e| e.id.as_deref() == Some(event_id))
                .ok_or_else(|| RemoteError::NotFound(format!("event {}", event_id)))?;
            *slot = EventResource {
                id: Some(event_id.to_string()),
                html_link: slot.html_link.clone(),
                ..event.clone()
            };
            self.updated
                .lock()
                .unwrap()
                .push((event_id.to_string(), event.clone()));
            Ok(slot.clone())
        }

        async fn delete_event(&self, event_id: &str) -> Result<(), RemoteError> {
            let mut events = self.events.lock().unwrap();
            let before = events.len();
            events.retain(|e| e.id.as_deref() != Some(event_id));
            if events.len() == before {
                return Err(RemoteError::NotFound(format!("event {}", event_id)));
            }
            self.deleted.lock().unwrap().push(event_id.to_string());
            Ok(())
        }
    }

    /// In-memory mailbox. Messages listed in `broken` fail to load.
    #[derive(Default)]
    pub(crate) struct FakeMail {
        pub(crate) messages: Vec<MessageDetail>,
        pub(crate) broken: HashSet<String>,
        pub(crate) queries: Mutex<Vec<(String, Vec<String>, u32)>>,
        pub(crate) sent: Mutex<Vec<String>>,
        pub(crate) trashed: Mutex<Vec<String>>,
        pub(crate) modified: Mutex<Vec<(String, Vec<String>, Vec<String>)>>,
    }

    impl FakeMail {
        pub(crate) fn with_messages(messages: Vec<MessageDetail>) -> Self {
            Self {
                messages,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl MailApi for FakeMail {
        async fn list_message_ids(
            &self,
            query: &str,
            label_ids: &[&str],
            max_results: u32,
        ) -> Result<Vec<String>, RemoteError> {
            self.queries.lock().unwrap().push((
                query.to_string(),
                label_ids.iter().map(|l| l.to_string()).collect(),
                max_results,
            ));
            Ok(self
                .messages
                .iter()
                .take(max_results as usize)
                .map(|m| m.id.clone())
                .collect())
        }

        async fn get_message(&self, message_id: &str) -> Result<MessageDetail, RemoteError> {
            if self.broken.contains(message_id) {
                return Err(RemoteError::Api {
                    status: 500,
                    message: "backend error".into(),
                });
            }
            self.messages
                .iter()
                .find(|m| m.id == message_id)
                .cloned()
                .ok_or_else(|| RemoteError::NotFound(format!("message {}", message_id)))
        }

        async fn send_raw(&self, raw: &str) -> Result<SentMessage, RemoteError> {
            self.sent.lock().unwrap().push(raw.to_string());
            Ok(SentMessage {
                id: "sent-1".into(),
                thread_id: "thread-1".into(),
            })
        }

        async fn trash_message(&self, message_id: &str) -> Result<(), RemoteError> {
            if !self.messages.iter().any(|m| m.id == message_id) {
                return Err(RemoteError::NotFound(format!("message {}", message_id)));
            }
            self.trashed.lock().unwrap().push(message_id.to_string());
            Ok(())
        }

        async fn modify_labels(
            &self,
            message_id: &str,
            add: &[&str],
            remove: &[&str],
        ) -> Result<(), RemoteError> {
            if !self.messages.iter().any(|m| m.id == message_id) {
                return Err(RemoteError::NotFound(format!("message {}", message_id)));
            }
            self.modified.lock().unwrap().push((
                message_id.to_string(),
                add.iter().map(|l| l.to_string()).collect(),
                remove.iter().map(|l| l.to_string()).collect(),
            ));
            Ok(())
        }
    }

    /// In-memory task lists. Inserts whose title is in `failing_titles` are rejected.
    #[derive(Default)]
    pub(crate) struct FakeTasks {
        pub(crate) lists: Vec<TaskList>,
        pub(crate) tasks: Mutex<HashMap<String, Vec<TaskResource>>>,
        pub(crate) failing_titles: HashSet<String>,
        pub(crate) inserted: Mutex<Vec<(String, TaskResource, Option<String>)>>,
        pub(crate) patched: Mutex<Vec<(String, String, TaskResource)>>,
        pub(crate) deleted: Mutex<Vec<(String, String)>>,
        pub(crate) filters: Mutex<Vec<TaskFilter>>,
    }

    impl FakeTasks {
        pub(crate) fn with_tasks(tasklist_id: &str, tasks: Vec<TaskResource>) -> Self {
            let fake = Self::default();
            fake.tasks
                .lock()
                .unwrap()
                .insert(tasklist_id.to_string(), tasks);
            fake
        }
    }

    #[async_trait]
    impl TasksApi for FakeTasks {
        async fn list_tasklists(&self) -> Result<Vec<TaskList>, RemoteError> {
            Ok(self.lists.clone())
        }

        async fn list_tasks(
            &self,
            tasklist_id: &str,
            filter: &TaskFilter,
        ) -> Result<Vec<TaskResource>, RemoteError> {
            self.filters.lock().unwrap().push(*filter);
            let tasks = self.tasks.lock().unwrap();
            Ok(tasks
                .get(tasklist_id)
                .map(|list| {
                    list.iter()
                        .filter(|t| filter.show_completed || !t.is_completed())
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn insert_task(
            &self,
            tasklist_id: &str,
            task: &TaskResource,
            parent: Option<&str>,
        ) -> Result<TaskResource, RemoteError> {
            let title = task.title.clone().unwrap_or_default();
            if self.failing_titles.contains(&title) {
                return Err(RemoteError::Api {
                    status: 400,
                    message: format!("cannot create {}", title),
                });
            }
            let mut inserted = self.inserted.lock().unwrap();
            inserted.push((
                tasklist_id.to_string(),
                task.clone(),
                parent.map(str::to_string),
            ));
            Ok(TaskResource {
                id: Some(format!("task-{}", inserted.len())),
                parent: parent.map(str::to_string),
                ..task.clone()
            })
        }

        async fn patch_task(
            &self,
            tasklist_id: &str,
            task_id: &str,
            patch: &TaskResource,
        ) -> Result<TaskResource, RemoteError> {
            let tasks = self.tasks.lock().unwrap();
            let existing = tasks
                .get(tasklist_id)
                .and_then(|list| list.iter().find(|t| t.id.as_deref() == Some(task_id)))
                .cloned()
                .ok_or_else(|| RemoteError::NotFound(format!("task {}", task_id)))?;
            self.patched.lock().unwrap().push((
                tasklist_id.to_string(),
                task_id.to_string(),
                patch.clone(),
            ));
            Ok(TaskResource {
                title: patch.title.clone().or(existing.title),
                notes: patch.notes.clone().or(existing.notes),
                status: patch.status.clone().or(existing.status),
                due: patch.due.or(existing.due),
                ..existing
            })
        }

        async fn delete_task(&self, tasklist_id: &str, task_id: &str) -> Result<(), RemoteError> {
            self.deleted
                .lock()
                .unwrap()
                .push((tasklist_id.to_string(), task_id.to_string()));
            Ok(())
        }
    }

    pub(crate) fn task(id: &str, title: &str) -> TaskResource {
        TaskResource {
            id: Some(id.to_string()),
            title: Some(title.to_string()),
            status: Some("needsAction".to_string()),
            ..TaskResource::default()
        }
    }

    pub(crate) fn clients(
        calendar: Arc<FakeCalendar>,
        mail: Arc<FakeMail>,
        tasks: Arc<FakeTasks>,
    ) -> RemoteClients {
        RemoteClients {
            calendar,
            mail,
            tasks,
        }
    }

    #[test]
    fn remote_errors_map_to_taxonomy() {
        assert_eq!(RemoteError::Unauthorized.kind(), ErrorKind::RemoteUnavailable);
        assert_eq!(RemoteError::NotFound("event".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            RemoteError::Api {
                status: 400,
                message: "bad".into()
            }
            .kind(),
            ErrorKind::RemoteRejected
        );
        assert_eq!(
            RemoteError::InvalidId("..".into()).kind(),
            ErrorKind::ValidationFailed
        );
    }

    #[test]
    fn endpoint_keeps_each_id_in_one_segment() {
        let url = endpoint("http://h/tasks/v1/", &["lists", "@default", "tasks", "a?b#c d"]).unwrap();
        assert_eq!(url.path(), "/tasks/v1/lists/@default/tasks/a%3Fb%23c%20d");
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn endpoint_rejects_traversal_ids() {
        for bad in ["", ".", "..", "../../users/@me/lists/L1", "a/b", "a\\b"] {
            assert!(
                matches!(endpoint("http://h/tasks/v1", &["lists", bad]), Err(RemoteError::InvalidId(_))),
                "{:?} accepted",
                bad
            );
        }
    }

    #[test]
    fn base_url_override_keeps_api_paths() {
        let factory = GoogleClientFactory::with_base_url("http://127.0.0.1:1234/");
        assert_eq!(factory.calendar_base, "http://127.0.0.1:1234/calendar/v3");
        assert_eq!(factory.gmail_base, "http://127.0.0.1:1234/gmail/v1");
        assert_eq!(factory.tasks_base, "http://127.0.0.1:1234/tasks/v1");
    }
}
