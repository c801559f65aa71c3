//! System instructions sent to the oracle.
//!
//! Each domain prompt embeds the action schema and the request's date anchors,
//! so the oracle can resolve "tomorrow" or "this month" itself. The normalizer
//! still resolves anything relative that slips through.

use super::date_context::{DateContext, DateStyle};
use super::intent::{CATEGORY_COLORS, Domain};

pub fn system_prompt(domain: Domain, ctx: &DateContext) -> String {
    match domain {
        Domain::Calendar => calendar_prompt(ctx),
        Domain::Email => email_prompt(ctx),
        Domain::Tasks => tasks_prompt(ctx),
    }
}

fn category_list() -> String {
    CATEGORY_COLORS
        .iter()
        .map(|(name, color)| format!("{} → \"{}\"", name, color))
        .collect::<Vec<_>>()
        .join(", ")
}

fn calendar_prompt(ctx: &DateContext) -> String {
    format!(
        r#"You are a smart assistant that extracts structured calendar actions from natural language.

Current local date is {today}, and time is {time} (UTC{offset}). Tomorrow is {tomorrow}. This month runs from {month_start} to {month_end}. Use this for interpreting relative dates like "tomorrow", "this week", "next month".

Return a SINGLE-LINE valid JSON object for ONE of the following actions:

1. Add Event
{{"action": "add_event", "title": string, "date": "YYYY-MM-DD", "time": "HH:MM" | null, "duration_minutes": number | null, "description": string | null, "location": string | null, "attendees": [email, ...] | [], "colorId": string | null, "category": string | null}}

2. Update Event
{{"action": "update_event", "event_id": string | null, "old_title": string, "new_title": string | null, "new_date": "YYYY-MM-DD" | null, "new_time": "HH:MM" | null, "new_duration_minutes": number | null, "description": string | null, "location": string | null, "attendees": [email, ...] | [], "colorId": string | null, "category": string | null}}

3. Delete Event
{{"action": "delete_event", "event_id": string | null, "title": string}}

4. Fetch Events
{{"action": "fetch_events", "title": string | null, "query": string | null, "date": "YYYY-MM-DD" | null, "month": string | null, "year": number | null, "timeMin": "YYYY-MM-DD" | null, "timeMax": "YYYY-MM-DD" | null, "deadline": "YYYY-MM-DD" | null, "category": string | null}}

Rules:
- Only include fields relevant to the action.
- Use timeMin and timeMax for ranges (e.g. this week/month/year).
- Set unknown fields to null or an empty array.
- Categories must be one of: {categories}.
- DO NOT include anything outside the JSON object. No explanations, comments, or line breaks."#,
        today = ctx.today(DateStyle::Dashed),
        time = ctx.clock_time(),
        offset = ctx.offset_label(),
        tomorrow = ctx.tomorrow(DateStyle::Dashed),
        month_start = ctx.start_of_month(DateStyle::Dashed),
        month_end = ctx.end_of_month(DateStyle::Dashed),
        categories = category_list(),
    )
}

fn email_prompt(ctx: &DateContext) -> String {
    let today = ctx.today(DateStyle::Slashed);
    let tomorrow = ctx.tomorrow(DateStyle::Slashed);
    format!(
        r#"You are an assistant that interprets user instructions for Gmail actions.
Respond ONLY in valid JSON. No explanations.

Context:
- Today: {today}
- Tomorrow: {tomorrow}
- This month: from {month_start} to {month_end}

Rules:
1. If action = "send_email", expand and rephrase the subject and message into a clear, professional, or polite structure depending on the tone of the prompt.
2. If action = "search_emails", replace natural phrases like "today", "tomorrow", or "this month" with yyyy/mm/dd values using the context above.
3. Always return a structured JSON object with {{ "action", "data" }}.

Allowed actions:
- "send_email" {{ to, subject, message }}
- "get_email" {{ messageId }}
- "delete_email" {{ messageId }}
- "fetch_emails" {{ query, maxResults }}
- "search_emails" {{ unread?, from?, subject?, keyword?, after?, before?, maxResults? }}

Example:
{{"action": "search_emails", "data": {{"keyword": "meeting notes", "after": "{today}", "before": "{tomorrow}", "unread": true}}}}"#,
        today = today,
        tomorrow = tomorrow,
        month_start = ctx.start_of_month(DateStyle::Slashed),
        month_end = ctx.end_of_month(DateStyle::Slashed),
    )
}

fn tasks_prompt(ctx: &DateContext) -> String {
    format!(
        r#"You are an AI that converts user requests into valid JSON instructions for the Google Tasks API.

Current context:
- Today's date: {today}
- Current time: {time}
- Timezone offset: {offset}
- "today" means {today}; "tomorrow" means {tomorrow}.
- For "next <weekday>", calculate the exact date from today's date.
- For times like "at 3pm", combine with the correct date into a full ISO 8601 date-time with the timezone offset.

Output by action:
1. CREATE
{{"action": "create", "tasklistId": string | "@default", "task": {{"title": string, "notes": string | null, "due": string | null, "status": "needsAction" | "completed" | null, "subtasks": [{{"title": string, "notes": string | null}}] | []}}}}

2. UPDATE
{{"action": "update", "tasklistId": string | "@default", "taskId": string | null, "title": string | null, "updates": {{"title": string | null, "notes": string | null, "due": string | null, "status": "needsAction" | "completed" | null}}}}
Use the top-level "title" for the task being changed when no taskId is known.

3. DELETE
{{"action": "delete", "tasklistId": string | "@default", "taskId": string | null, "title": string | null}}

4. LIST
{{"action": "list", "tasklistId": string | "@default", "filter": string | null}}

General rules:
- Only output JSON. No markdown, no explanations, no backticks.
- Always resolve relative dates/times into exact ISO format.
- If no time is provided for a due date, use 09:00:00 local time.
- Subtasks are only allowed for create."#,
        today = ctx.today(DateStyle::Dashed),
        tomorrow = ctx.tomorrow(DateStyle::Dashed),
        time = ctx.now.format("%H:%M:%S"),
        offset = ctx.offset_label(),
    )
}

/// Instructions for turning a result payload back into prose.
pub fn summary_prompt() -> &'static str {
    r#"You are an assistant that converts JSON into clear, natural sentences for users.
Be concise, friendly, and context-aware. Adapt your tone based on the agent type.

- If it's "calendar": summarize events (title, date, time, location).
- If it's "tasks": explain task status, due dates, or updates.
- If it's "gmail": summarize email subjects, senders, and times.
- If "generic": just describe the JSON naturally."#
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn ctx() -> DateContext {
        DateContext::resolve(DateTime::parse_from_rfc3339("2024-06-10T10:30:00+05:30").unwrap())
    }

    #[test]
    fn calendar_prompt_grounds_dates_and_categories() {
        let prompt = system_prompt(Domain::Calendar, &ctx());
        assert!(prompt.contains("Current local date is 2024-06-10"));
        assert!(prompt.contains("Tomorrow is 2024-06-11"));
        assert!(prompt.contains("Work → \"5\""));
        for action in Domain::Calendar.actions() {
            assert!(prompt.contains(action), "missing {}", action);
        }
    }

    #[test]
    fn email_prompt_uses_gmail_date_style() {
        let prompt = system_prompt(Domain::Email, &ctx());
        assert!(prompt.contains("Today: 2024/06/10"));
        assert!(prompt.contains("from 2024/06/01 to 2024/06/30"));
    }

    #[test]
    fn tasks_prompt_carries_offset() {
        let prompt = system_prompt(Domain::Tasks, &ctx());
        assert!(prompt.contains("Timezone offset: +05:30"));
        assert!(prompt.contains("\"tomorrow\" means 2024-06-11"));
    }
}
