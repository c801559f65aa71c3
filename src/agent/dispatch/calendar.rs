use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime};
use serde_json::json;
use tracing::debug;

use super::{ActionResult, Failure, Outcome};
use crate::agent::date_context::DateContext;
use crate::agent::intent::*;
use crate::agent::normalize::{at_local, default_time};
use crate::google::{Attendee, CalendarApi, EventResource, EventTime, EventWindow, Reminders};

/// How many upcoming events a title lookup scans.
const TITLE_LOOKUP_LIMIT: u32 = 500;

pub(crate) async fn dispatch(
    intent: &CalendarIntent,
    api: &dyn CalendarApi,
    ctx: &DateContext,
    tz_name: &str,
) -> Outcome {
    match intent {
        CalendarIntent::AddEvent(event) => add_event(event, api, tz_name).await,
        CalendarIntent::UpdateEvent(update) => update_event(update, api, ctx, tz_name).await,
        CalendarIntent::DeleteEvent(target) => delete_event(target, api, ctx).await,
        CalendarIntent::FetchEvents(query) => fetch_events(query, api, ctx).await,
    }
}

async fn add_event(event: &NewEvent, api: &dyn CalendarApi, tz_name: &str) -> Outcome {
    let resource = EventResource {
        summary: Some(event.title.clone()),
        description: event.description.clone(),
        location: event.location.clone(),
        start: Some(EventTime::at(event.start, tz_name)),
        end: Some(EventTime::at(event.end(), tz_name)),
        attendees: attendee_list(&event.attendees),
        reminders: Some(Reminders::default()),
        color_id: event.color_id.clone(),
        ..EventResource::default()
    };

    let created = api.insert_event(&resource).await?;
    Ok(ActionResult::success(
        json!({ "link": created.html_link, "event": created }),
        "Event added!",
    ))
}

async fn update_event(
    update: &EventUpdate,
    api: &dyn CalendarApi,
    ctx: &DateContext,
    tz_name: &str,
) -> Outcome {
    let existing = resolve_target(&update.target, api, ctx).await?;
    let event_id = existing
        .id
        .clone()
        .ok_or_else(|| Failure::not_found("Matched event has no id"))?;

    let (start, end) = if update.new_date.is_some()
        || update.new_time.is_some()
        || update.new_duration_minutes.is_some()
    {
        let (start, end) = reschedule(&existing, update, ctx)?;
        (
            Some(EventTime::at(start, tz_name)),
            Some(EventTime::at(end, tz_name)),
        )
    } else {
        (existing.start.clone(), existing.end.clone())
    };

    let merged = EventResource {
        id: None,
        summary: update.new_title.clone().or(existing.summary),
        description: update.description.clone().or(existing.description),
        location: update.location.clone().or(existing.location),
        start,
        end,
        attendees: attendee_list(&update.attendees).or(existing.attendees),
        reminders: existing.reminders.or_else(|| Some(Reminders::default())),
        color_id: update.color_id.clone().or(existing.color_id),
        html_link: None,
        status: None,
        extra: existing.extra,
    };

    let updated = api.update_event(&event_id, &merged).await?;
    Ok(ActionResult::success(
        json!({ "link": updated.html_link, "event": updated }),
        "Event updated successfully!",
    ))
}

/// New start/end from the supplied fields, falling back to the event's current slot.
fn reschedule(
    existing: &EventResource,
    update: &EventUpdate,
    ctx: &DateContext,
) -> Result<(DateTime<FixedOffset>, DateTime<FixedOffset>), Failure> {
    let offset = ctx.offset();
    let old_start = existing.start.as_ref().and_then(|t| t.instant(offset));
    let old_end = existing.end.as_ref().and_then(|t| t.instant(offset));
    let all_day = existing.start.as_ref().is_some_and(EventTime::is_all_day);

    let date = update
        .new_date
        .or(old_start.map(|s| s.date_naive()))
        .unwrap_or(ctx.anchor_date);
    let time = match (update.new_time, old_start) {
        (Some(time), _) => time,
        (None, Some(start)) if !all_day => start.time(),
        _ => default_time(),
    };
    let minutes = match (update.new_duration_minutes, old_start, old_end) {
        (Some(minutes), _, _) => i64::from(minutes),
        (None, Some(start), Some(end)) if !all_day && end > start => (end - start).num_minutes(),
        _ => i64::from(DEFAULT_DURATION_MINUTES),
    };

    let start = at_local(date, time, offset)
        .ok_or_else(|| Failure::validation(format!("{} {} is not a valid time", date, time)))?;
    Ok((start, start + Duration::minutes(minutes)))
}

async fn delete_event(target: &EventTarget, api: &dyn CalendarApi, ctx: &DateContext) -> Outcome {
    let event = resolve_target(target, api, ctx).await?;
    let event_id = event
        .id
        .clone()
        .ok_or_else(|| Failure::not_found("Matched event has no id"))?;
    let label = event.summary.unwrap_or_default();

    api.delete_event(&event_id).await?;
    Ok(ActionResult::success(
        json!({ "eventId": event_id, "deletedTitle": label }),
        "Event deleted successfully.",
    ))
}

/// Locate an event by id, or by the first upcoming event whose title contains the given text.
pub(crate) async fn resolve_target(
    target: &EventTarget,
    api: &dyn CalendarApi,
    ctx: &DateContext,
) -> Result<EventResource, Failure> {
    if let Some(id) = &target.event_id {
        return Ok(api.get_event(id).await?);
    }

    let Some(title) = &target.title else {
        return Err(Failure::validation("Either an event id or a title is required."));
    };

    let window = EventWindow {
        time_min: Some(ctx.now),
        max_results: TITLE_LOOKUP_LIMIT,
        ..EventWindow::default()
    };
    let events = api.list_events(&window).await?;
    debug!(title = %title, scanned = events.len(), "Looking up event by title");

    events
        .into_iter()
        .take(TITLE_LOOKUP_LIMIT as usize)
        .find(|event| event.summary_contains(title))
        .ok_or_else(|| Failure::not_found(format!("No event found with title: \"{}\"", title)))
}

async fn fetch_events(query: &EventQuery, api: &dyn CalendarApi, ctx: &DateContext) -> Outcome {
    let mut window = fetch_window(query, ctx)?;
    if window.time_max.is_none() {
        window.time_max = query.deadline;
    }

    let offset = ctx.offset();
    let events: Vec<EventResource> = api
        .list_events(&window)
        .await?
        .into_iter()
        .filter(|event| {
            query
                .title
                .as_deref()
                .is_none_or(|title| event.summary_contains(title))
        })
        .filter(|event| matches_category(event, query))
        .filter(|event| match query.deadline {
            None => true,
            Some(deadline) => event
                .end
                .as_ref()
                .and_then(|end| end.instant(offset))
                .is_some_and(|end| end <= deadline),
        })
        .collect();

    let message = format!("Found {} event(s).", events.len());
    Ok(ActionResult::success(json!({ "events": events }), message))
}

/// Explicit range, then single date, then month/year, then from now onward.
pub(crate) fn fetch_window(query: &EventQuery, ctx: &DateContext) -> Result<EventWindow, Failure> {
    let offset = ctx.offset();
    let midnight = |date: NaiveDate| {
        at_local(date, NaiveTime::MIN, offset)
            .ok_or_else(|| Failure::validation(format!("{} has no local midnight", date)))
    };

    let (time_min, time_max) = if query.time_min.is_some() || query.time_max.is_some() {
        (Some(query.time_min.unwrap_or(ctx.now)), query.time_max)
    } else if let Some(date) = query.date {
        let next = date
            .succ_opt()
            .ok_or_else(|| Failure::validation(format!("{} is out of range", date)))?;
        (Some(midnight(date)?), Some(midnight(next)?))
    } else if query.month.is_some() || query.year.is_some() {
        let year = query.year.unwrap_or_else(|| ctx.anchor_date.year());
        let (first, next) = match query.month {
            Some(12) => (
                NaiveDate::from_ymd_opt(year, 12, 1),
                year.checked_add(1)
                    .and_then(|next_year| NaiveDate::from_ymd_opt(next_year, 1, 1)),
            ),
            Some(month) => (
                NaiveDate::from_ymd_opt(year, month, 1),
                month
                    .checked_add(1)
                    .and_then(|next_month| NaiveDate::from_ymd_opt(year, next_month, 1)),
            ),
            None => (
                NaiveDate::from_ymd_opt(year, 1, 1),
                year.checked_add(1)
                    .and_then(|next_year| NaiveDate::from_ymd_opt(next_year, 1, 1)),
            ),
        };
        match (first, next) {
            (Some(first), Some(next)) => (Some(midnight(first)?), Some(midnight(next)?)),
            _ => return Err(Failure::validation("Month or year is out of range.")),
        }
    } else {
        (Some(ctx.now), None)
    };

    Ok(EventWindow {
        time_min,
        time_max,
        query: query.query.clone(),
        ..EventWindow::default()
    })
}

fn matches_category(event: &EventResource, query: &EventQuery) -> bool {
    let Some(category) = query.category.as_deref() else {
        return true;
    };
    let color_match = query
        .color_id
        .as_deref()
        .is_some_and(|color| event.color_id.as_deref() == Some(color));
    let description_match = event
        .description
        .as_deref()
        .is_some_and(|d| d.to_lowercase().contains(&category.to_lowercase()));
    color_match || description_match
}

fn attendee_list(emails: &[String]) -> Option<Vec<Attendee>> {
    if emails.is_empty() {
        None
    } else {
        Some(emails.iter().map(Attendee::new).collect())
    }
}
