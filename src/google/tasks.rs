//! Google Tasks API v1.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use super::{RemoteError, TasksApi, check_status, endpoint, http_client};

pub const TASKS_API_BASE: &str = "https://tasks.googleapis.com/tasks/v1";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// "needsAction" or "completed"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_view_link: Option<String>,
    /// Display name of the owning list; filled in locally for cross-list views.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasklist_name: Option<String>,
}

impl TaskResource {
    pub fn title_matches(&self, title: &str) -> bool {
        self.title
            .as_deref()
            .is_some_and(|t| t.trim().eq_ignore_ascii_case(title.trim()))
    }

    pub fn is_completed(&self) -> bool {
        self.status.as_deref() == Some("completed")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskList {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskFilter {
    pub show_completed: bool,
    pub show_hidden: bool,
    pub max_results: u32,
}

impl Default for TaskFilter {
    fn default() -> Self {
        Self {
            show_completed: true,
            show_hidden: false,
            max_results: 100,
        }
    }
}

impl TaskFilter {
    /// Everything, for title lookups.
    pub fn everything() -> Self {
        Self {
            show_completed: true,
            show_hidden: true,
            max_results: 100,
        }
    }

    pub fn incomplete() -> Self {
        Self {
            show_completed: false,
            show_hidden: false,
            max_results: 100,
        }
    }
}

#[derive(Deserialize)]
struct ItemsResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

pub struct GoogleTasks {
    client: Client,
    access_token: String,
    base_url: String,
}

impl GoogleTasks {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            access_token: access_token.into(),
            base_url: TASKS_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn tasks_url(&self, tasklist_id: &str) -> Result<Url, RemoteError> {
        endpoint(&self.base_url, &["lists", tasklist_id, "tasks"])
    }

    fn task_url(&self, tasklist_id: &str, task_id: &str) -> Result<Url, RemoteError> {
        endpoint(&self.base_url, &["lists", tasklist_id, "tasks", task_id])
    }
}

#[async_trait]
impl TasksApi for GoogleTasks {
    async fn list_tasklists(&self) -> Result<Vec<TaskList>, RemoteError> {
        let response = self
            .client
            .get(endpoint(&self.base_url, &["users", "@me", "lists"])?)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let response = check_status(response, "task lists").await?;
        let body: ItemsResponse<TaskList> = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(format!("task lists: {}", e)))?;
        Ok(body.items)
    }

    async fn list_tasks(
        &self,
        tasklist_id: &str,
        filter: &TaskFilter,
    ) -> Result<Vec<TaskResource>, RemoteError> {
        let response = self
            .client
            .get(self.tasks_url(tasklist_id)?)
            .bearer_auth(&self.access_token)
            .query(&[
                ("showCompleted", filter.show_completed.to_string()),
                ("showHidden", filter.show_hidden.to_string()),
                ("maxResults", filter.max_results.to_string()),
            ])
            .send()
            .await?;
        let response = check_status(response, &format!("task list {}", tasklist_id)).await?;
        let body: ItemsResponse<TaskResource> = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(format!("tasks: {}", e)))?;
        Ok(body.items)
    }

    async fn insert_task(
        &self,
        tasklist_id: &str,
        task: &TaskResource,
        parent: Option<&str>,
    ) -> Result<TaskResource, RemoteError> {
        let mut request = self
            .client
            .post(self.tasks_url(tasklist_id)?)
            .bearer_auth(&self.access_token)
            .json(task);
        if let Some(parent) = parent {
            request = request.query(&[("parent", parent)]);
        }

        let response = request.send().await?;
        let response = check_status(response, &format!("task list {}", tasklist_id)).await?;
        response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(format!("created task: {}", e)))
    }

    async fn patch_task(
        &self,
        tasklist_id: &str,
        task_id: &str,
        patch: &TaskResource,
    ) -> Result<TaskResource, RemoteError> {
        let response = self
            .client
            .patch(self.task_url(tasklist_id, task_id)?)
            .bearer_auth(&self.access_token)
            .json(patch)
            .send()
            .await?;
        let response = check_status(response, &format!("task {}", task_id)).await?;
        response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(format!("updated task: {}", e)))
    }

    async fn delete_task(&self, tasklist_id: &str, task_id: &str) -> Result<(), RemoteError> {
        let response = self
            .client
            .delete(self.task_url(tasklist_id, task_id)?)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        check_status(response, &format!("task {}", task_id)).await?;
        Ok(())
    }
}
