use serde_json::json;
use tracing::debug;

use super::{ActionResult, Failure, Outcome};
use crate::agent::intent::*;
use crate::google::{MailApi, RemoteError};
use crate::google::gmail::{MessageSummary, breaks_header, encode_plain_message};

const INBOX: &str = "INBOX";

pub(crate) async fn dispatch(intent: &EmailIntent, api: &dyn MailApi) -> Outcome {
    match intent {
        EmailIntent::SendEmail(email) => send_email(email, api).await,
        EmailIntent::GetEmail(message) => get_email(message, api).await,
        EmailIntent::DeleteEmail(message) => delete_email(message, api).await,
        EmailIntent::FetchEmails(query) => {
            let emails = list_inbox(api, &query.query, query.max_results).await?;
            let message = format!("Fetched {} email(s).", emails.len());
            Ok(ActionResult::success(json!({ "emails": emails }), message))
        }
        EmailIntent::SearchEmails(search) => {
            let query = search.to_query();
            let emails = list_inbox(api, &query, search.max_results).await?;
            let message = format!("Found {} email(s).", emails.len());
            Ok(ActionResult::success(
                json!({ "query": query, "emails": emails }),
                message,
            ))
        }
    }
}

async fn send_email(email: &OutgoingEmail, api: &dyn MailApi) -> Outcome {
    if email.to.trim().is_empty() || email.subject.trim().is_empty() || email.message.trim().is_empty()
    {
        return Err(Failure::validation(
            "Missing fields for send_email: to, subject and message are all required.",
        ));
    }

    if breaks_header(&email.to) || breaks_header(&email.subject) {
        return Err(Failure::validation(
            "Recipient and subject must each be a single line.",
        ));
    }

    let raw = encode_plain_message(&email.to, &email.subject, &email.message);
    let sent = api.send_raw(&raw).await?;
    Ok(ActionResult::success(
        json!({ "id": sent.id, "threadId": sent.thread_id }),
        format!("Email sent to {}", email.to),
    ))
}

async fn get_email(message: &MessageRef, api: &dyn MailApi) -> Outcome {
    let id = required_id(message)?;
    let detail = api.get_message(id).await?;
    let summary = MessageSummary::from_detail(&detail);
    let body = detail.plain_text();
    Ok(ActionResult::success(
        json!({ "email": summary, "body": body, "labels": detail.label_ids }),
        format!("Loaded email {}", id),
    ))
}

async fn delete_email(message: &MessageRef, api: &dyn MailApi) -> Outcome {
    let id = required_id(message)?;
    api.trash_message(id).await?;
    Ok(ActionResult::success(
        json!({ "messageId": id }),
        format!("Email {} moved to trash", id),
    ))
}

fn required_id(message: &MessageRef) -> Result<&str, Failure> {
    let id = message.message_id.trim();
    if id.is_empty() {
        return Err(Failure::validation("Missing messageId."));
    }
    Ok(id)
}

/// List inbox messages, then load each one's headers.
///
/// Messages that fail to load are skipped.
pub(crate) async fn list_inbox(
    api: &dyn MailApi,
    query: &str,
    max_results: u32,
) -> Result<Vec<MessageSummary>, RemoteError> {
    let ids = api.list_message_ids(query, &[INBOX], max_results).await?;

    let mut emails = Vec::with_capacity(ids.len());
    for id in &ids {
        match api.get_message(id).await {
            Ok(detail) => emails.push(MessageSummary::from_detail(&detail)),
            Err(e) => {
                debug!(message_id = %id, error = %e, "Skipping message");
                continue;
            }
        }
    }

    Ok(emails)
}
