use serde_json::json;
use tracing::{debug, warn};

use super::{ActionResult, Failure, Outcome};
use crate::agent::intent::*;
use crate::google::{TaskFilter, TaskResource, TasksApi};

pub(crate) async fn dispatch(intent: &TaskIntent, api: &dyn TasksApi) -> Outcome {
    match intent {
        TaskIntent::Create(task) => create(task, api).await,
        TaskIntent::Update(update) => update_task(update, api).await,
        TaskIntent::Delete(target) => {
            let task_id = resolve_task_id(target, api).await?;
            api.delete_task(&target.tasklist_id, &task_id).await?;
            Ok(ActionResult::success(
                json!({ "taskId": task_id, "tasklistId": target.tasklist_id }),
                "Task deleted successfully.",
            ))
        }
        TaskIntent::List(listing) => list(listing, api).await,
    }
}

/// Create the parent, then each subtask under it. Subtask failures never undo the parent.
async fn create(task: &NewTask, api: &dyn TasksApi) -> Outcome {
    if task.title.trim().is_empty() {
        return Err(Failure::validation("Task title is required."));
    }

    let body = TaskResource {
        title: Some(task.title.clone()),
        notes: Some(task.notes.clone()),
        status: Some(task.status.as_str().to_string()),
        due: task.due,
        ..TaskResource::default()
    };
    let parent = api.insert_task(&task.tasklist_id, &body, None).await?;

    let mut created = Vec::new();
    let mut failed = Vec::new();
    match parent.id.as_deref() {
        Some(parent_id) => {
            for sub in &task.subtasks {
                let sub_body = TaskResource {
                    title: Some(sub.title.clone()),
                    notes: Some(sub.notes.clone()),
                    ..TaskResource::default()
                };
                match api
                    .insert_task(&task.tasklist_id, &sub_body, Some(parent_id))
                    .await
                {
                    Ok(child) => created.push(child),
                    Err(e) => {
                        warn!(subtask = %sub.title, parent_id, error = %e, "Failed to create subtask");
                        failed.push(sub.title.clone());
                    }
                }
            }
        }
        None if !task.subtasks.is_empty() => {
            warn!(title = %task.title, "Created task has no id; skipping subtasks");
            failed.extend(task.subtasks.iter().map(|s| s.title.clone()));
        }
        None => {}
    }

    let message = if failed.is_empty() {
        "Task created successfully.".to_string()
    } else {
        format!(
            "Task created; {} of {} subtasks failed: {}",
            failed.len(),
            task.subtasks.len(),
            failed.join(", ")
        )
    };

    Ok(ActionResult::success(
        json!({ "task": parent, "subtasks": created, "failedSubtasks": failed }),
        message,
    ))
}

async fn update_task(update: &TaskUpdate, api: &dyn TasksApi) -> Outcome {
    if update.changes.is_empty() {
        return Err(Failure::validation("No task changes were supplied."));
    }

    let task_id = resolve_task_id(&update.target, api).await?;
    let patch = TaskResource {
        title: update.changes.title.clone(),
        notes: update.changes.notes.clone(),
        status: update.changes.status.map(|s| s.as_str().to_string()),
        due: update.changes.due,
        ..TaskResource::default()
    };

    let updated = api
        .patch_task(&update.target.tasklist_id, &task_id, &patch)
        .await?;
    Ok(ActionResult::success(
        json!({ "task": updated }),
        "Task updated successfully.",
    ))
}

async fn list(listing: &TaskListing, api: &dyn TasksApi) -> Outcome {
    let tasks = api
        .list_tasks(&listing.tasklist_id, &TaskFilter::default())
        .await?;

    let tasks: Vec<TaskResource> = match listing.filter.as_deref() {
        Some(keyword) => {
            let keyword = keyword.to_lowercase();
            tasks
                .into_iter()
                .filter(|t| {
                    [t.title.as_deref(), t.notes.as_deref()]
                        .into_iter()
                        .flatten()
                        .any(|text| text.to_lowercase().contains(&keyword))
                })
                .collect()
        }
        None => tasks,
    };

    let message = format!("Found {} task(s).", tasks.len());
    Ok(ActionResult::success(json!({ "tasks": tasks }), message))
}

/// Task id as given, or the id of the task whose title matches exactly (ignoring case).
pub(crate) async fn resolve_task_id(
    target: &TaskTarget,
    api: &dyn TasksApi,
) -> Result<String, Failure> {
    if let Some(id) = &target.task_id {
        return Ok(id.clone());
    }

    let Some(title) = &target.title else {
        return Err(Failure::validation(
            "A task id or task title must be provided.",
        ));
    };

    let tasks = api
        .list_tasks(&target.tasklist_id, &TaskFilter::everything())
        .await?;
    debug!(title = %title, scanned = tasks.len(), "Looking up task by title");

    tasks
        .into_iter()
        .find(|t| t.title_matches(title))
        .and_then(|t| t.id)
        .ok_or_else(|| {
            Failure::not_found(format!(
                "Task with title \"{}\" not found in tasklist {}",
                title, target.tasklist_id
            ))
        })
}
