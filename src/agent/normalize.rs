use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveDateTime, NaiveTime,
    TimeZone, Weekday,
};
use chrono_english::{Dialect, parse_date_string};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use super::date_context::DateContext;
use super::intent::*;
use crate::error::ParseError;
use crate::google::is_path_segment;

const MAX_DURATION_MINUTES: u32 = 366 * 24 * 60;

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})[-/](\d{1,2})[-/](\d{1,2})$").unwrap());

static CLOCK_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\d{1,2})(?:[:.](\d{2}))?(?::(\d{2}))?\s*(am|pm|a\.m\.|p\.m\.)?$").unwrap()
});

static DATE_THEN_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(.+?)\s+(?:at\s+)?(\d{1,2}(?:[:.]\d{2}){1,2}\s*(?:am|pm|a\.m\.|p\.m\.)?|\d{1,2}\s*(?:am|pm|a\.m\.|p\.m\.)|noon|midnight)$",
    )
    .unwrap()
});

static WEEKDAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:(this|next|coming)\s+)?(monday|mon|tuesday|tues|tue|wednesday|wed|thursday|thurs|thur|thu|friday|fri|saturday|sat|sunday|sun)$",
    )
    .unwrap()
});

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Source fields for each normalized field, most specific first. The first
/// present, non-empty source wins.
mod aliases {
    pub const EVENT_ID: &[&str] = &["event_id", "eventId", "id"];
    pub const EVENT_TITLE: &[&str] = &["title", "summary"];
    pub const EVENT_DATE: &[&str] = &["date", "start_date"];
    pub const EVENT_TIME: &[&str] = &["time", "start_time"];
    pub const EVENT_DURATION: &[&str] = &["duration_minutes", "durationMinutes", "duration"];
    pub const COLOR_ID: &[&str] = &["colorId", "color_id"];

    // update_event accepts explicit old/new pairs or a single reused title
    pub const UPDATE_TARGET_TITLE: &[&str] = &["old_title", "oldTitle", "title"];
    pub const UPDATE_NEW_TITLE: &[&str] = &["new_title", "newTitle", "title"];
    pub const UPDATE_DATE: &[&str] = &["new_date", "newDate", "date"];
    pub const UPDATE_TIME: &[&str] = &["new_time", "newTime", "time"];
    pub const UPDATE_DURATION: &[&str] = &[
        "new_duration_minutes",
        "newDurationMinutes",
        "duration_minutes",
        "duration",
    ];

    pub const RANGE_MIN: &[&str] = &["timeMin", "time_min"];
    pub const RANGE_MAX: &[&str] = &["timeMax", "time_max"];

    pub const MESSAGE_ID: &[&str] = &["messageId", "message_id", "id"];
    pub const MAX_RESULTS: &[&str] = &["maxResults", "max_results"];

    pub const TASKLIST_ID: &[&str] = &["tasklistId", "tasklist_id", "tasklist"];
    pub const TASK_ID: &[&str] = &["taskId", "task_id", "id"];
    pub const TASK_TARGET_TITLE: &[&str] = &["old_title", "current_title", "title"];
    pub const TASK_NEW_TITLE: &[&str] = &["new_title", "title"];
    pub const TASK_FILTER: &[&str] = &["filter", "keyword", "query"];
}

/// Turn a raw oracle reply into a normalized intent for `domain`.
///
/// Deterministic for a given reply and `ctx`.
pub fn normalize(
    raw: &str,
    domain: Domain,
    ctx: &DateContext,
) -> Result<NormalizedIntent, ParseError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ParseError::malformed(raw, e.to_string()))?;

    let Value::Object(mut map) = value else {
        return Err(ParseError::unknown_action(raw, "reply is not a JSON object"));
    };

    let action = match map.get("action") {
        Some(Value::String(action)) => action.trim().to_string(),
        Some(_) => return Err(ParseError::unknown_action(raw, "action is not a string")),
        None => return Err(ParseError::unknown_action(raw, "missing action")),
    };

    if !domain.actions().contains(&action.as_str()) {
        return Err(ParseError::unknown_action(
            raw,
            format!("'{}' is not a {} action", action, domain),
        ));
    }

    // Email replies wrap their fields in a "data" object.
    if let Some(Value::Object(data)) = map.remove("data") {
        for (key, value) in data {
            map.insert(key, value);
        }
    }

    let fields = Fields {
        map: &map,
        raw,
        ctx,
    };

    let intent = match domain {
        Domain::Calendar => NormalizedIntent::Calendar(calendar_intent(&action, &fields)?),
        Domain::Email => NormalizedIntent::Email(email_intent(&action, &fields)?),
        Domain::Tasks => NormalizedIntent::Tasks(task_intent(&action, &fields)?),
    };
    Ok(intent)
}

// ============================================================================
// CALENDAR
// ============================================================================

fn calendar_intent(action: &str, f: &Fields) -> Result<CalendarIntent, ParseError> {
    match action {
        "add_event" => {
            let date_text = f
                .text(aliases::EVENT_DATE)
                .ok_or_else(|| f.invalid("add_event requires a date"))?;
            let (date, embedded_time) = f.date_and_time(&date_text)?;
            let time = match f.text(aliases::EVENT_TIME) {
                Some(t) => f.time(&t)?,
                None => embedded_time.unwrap_or_else(default_time),
            };
            let duration_minutes = f
                .duration(aliases::EVENT_DURATION)?
                .unwrap_or(DEFAULT_DURATION_MINUTES);
            let (category, color_id) = f.category_and_color();

            Ok(CalendarIntent::AddEvent(NewEvent {
                title: f
                    .text(aliases::EVENT_TITLE)
                    .unwrap_or_else(|| DEFAULT_EVENT_TITLE.to_string()),
                date,
                time,
                duration_minutes,
                start: f.local(date, time)?,
                description: f.text(&["description"]),
                location: f.text(&["location"]),
                attendees: f.list(&["attendees"]),
                category,
                color_id,
            }))
        }
        "update_event" => {
            let (new_date, embedded_time) = match f.text(aliases::UPDATE_DATE) {
                Some(text) => {
                    let (date, time) = f.date_and_time(&text)?;
                    (Some(date), time)
                }
                None => (None, None),
            };
            let new_time = match f.text(aliases::UPDATE_TIME) {
                Some(t) => Some(f.time(&t)?),
                None => embedded_time,
            };
            let (category, color_id) = f.category_and_color();

            Ok(CalendarIntent::UpdateEvent(EventUpdate {
                target: EventTarget {
                    event_id: f.id(aliases::EVENT_ID)?,
                    title: f.text(aliases::UPDATE_TARGET_TITLE),
                },
                new_title: f.text(aliases::UPDATE_NEW_TITLE),
                new_date,
                new_time,
                new_duration_minutes: f.duration(aliases::UPDATE_DURATION)?,
                description: f.text(&["description"]),
                location: f.text(&["location"]),
                attendees: f.list(&["attendees"]),
                category,
                color_id,
            }))
        }
        "delete_event" => Ok(CalendarIntent::DeleteEvent(EventTarget {
            event_id: f.id(aliases::EVENT_ID)?,
            title: f.text(aliases::UPDATE_TARGET_TITLE),
        })),
        "fetch_events" => {
            let date = match f.text(&["date"]) {
                Some(text) => Some(f.date_and_time(&text)?.0),
                None => None,
            };
            let month = match f.map.get("month") {
                None | Some(Value::Null) => None,
                Some(value) => Some(
                    parse_month(value)
                        .ok_or_else(|| f.invalid(format!("unrecognized month: {}", value)))?,
                ),
            };
            let year = match f.number(&["year"])? {
                Some(y) if (1..=9999).contains(&y) => Some(y as i32),
                Some(y) => return Err(f.invalid(format!("year {} is out of range", y))),
                None => None,
            };
            let (category, color_id) = f.category_and_color();

            Ok(CalendarIntent::FetchEvents(EventQuery {
                title: f.text(&["title"]),
                query: f.text(&["query", "q"]),
                date,
                month,
                year,
                time_min: f.bound(aliases::RANGE_MIN, Bound::StartOfDay)?,
                time_max: f.bound(aliases::RANGE_MAX, Bound::EndOfDay)?,
                deadline: f.bound(&["deadline"], Bound::EndOfDay)?,
                category,
                color_id,
            }))
        }
        other => Err(f.unknown(other)),
    }
}

// ============================================================================
// EMAIL
// ============================================================================

fn email_intent(action: &str, f: &Fields) -> Result<EmailIntent, ParseError> {
    let max_results = f
        .number(aliases::MAX_RESULTS)?
        .unwrap_or(DEFAULT_MAX_RESULTS)
        .clamp(1, 100);

    match action {
        "send_email" => Ok(EmailIntent::SendEmail(OutgoingEmail {
            to: f.list(&["to", "recipient", "recipients"]).join(", "),
            subject: f.text(&["subject"]).unwrap_or_default(),
            message: f.text(&["message", "body", "text"]).unwrap_or_default(),
        })),
        "get_email" => Ok(EmailIntent::GetEmail(MessageRef {
            message_id: f.id(aliases::MESSAGE_ID)?.unwrap_or_default(),
        })),
        "delete_email" => Ok(EmailIntent::DeleteEmail(MessageRef {
            message_id: f.id(aliases::MESSAGE_ID)?.unwrap_or_default(),
        })),
        "fetch_emails" => Ok(EmailIntent::FetchEmails(EmailQuery {
            query: f
                .text(&["query", "q"])
                .unwrap_or_else(|| DEFAULT_EMAIL_QUERY.to_string()),
            max_results,
        })),
        "search_emails" => {
            let after = match f.text(&["after"]) {
                Some(text) => Some(f.date_and_time(&text)?.0),
                None => None,
            };
            let before = match f.text(&["before"]) {
                Some(text) => Some(f.date_and_time(&text)?.0),
                None => None,
            };

            Ok(EmailIntent::SearchEmails(EmailSearch {
                unread: f.flag(&["unread", "is_unread"])?,
                from: f.text(&["from", "sender"]),
                subject: f.text(&["subject"]),
                keyword: f.text(&["keyword", "query"]),
                after,
                before,
                max_results,
            }))
        }
        other => Err(f.unknown(other)),
    }
}

// ============================================================================
// TASKS
// ============================================================================

fn task_intent(action: &str, f: &Fields) -> Result<TaskIntent, ParseError> {
    let tasklist_id = f
        .id(aliases::TASKLIST_ID)?
        .unwrap_or_else(|| DEFAULT_TASKLIST.to_string());

    match action {
        "create" => {
            let task = f.object("task").unwrap_or_else(|| f.clone());
            let status = task.status()?.unwrap_or_default();
            let due = match task.text(&["due", "due_date"]) {
                Some(text) => Some(task.instant(&text)?),
                None => None,
            };

            Ok(TaskIntent::Create(NewTask {
                tasklist_id,
                title: task.text(&["title"]).unwrap_or_default(),
                notes: task.text(&["notes"]).unwrap_or_default(),
                due,
                status,
                subtasks: task.subtasks(),
            }))
        }
        "update" => {
            let changes_src = f
                .object("updates")
                .or_else(|| f.object("task"))
                .unwrap_or_else(|| f.clone());
            let due = match changes_src.text(&["due", "due_date"]) {
                Some(text) => Some(changes_src.instant(&text)?),
                None => None,
            };

            Ok(TaskIntent::Update(TaskUpdate {
                target: TaskTarget {
                    tasklist_id,
                    task_id: f.id(aliases::TASK_ID)?,
                    title: f
                        .text(aliases::TASK_TARGET_TITLE)
                        .or_else(|| changes_src.text(&["title"])),
                },
                changes: TaskChanges {
                    title: changes_src
                        .text(aliases::TASK_NEW_TITLE)
                        .or_else(|| f.text(&["new_title"])),
                    notes: changes_src.text(&["notes"]),
                    due,
                    status: changes_src.status()?,
                },
            }))
        }
        "delete" => {
            let nested = f.object("task");
            let task_id = match f.id(aliases::TASK_ID)? {
                Some(id) => Some(id),
                None => nested
                    .as_ref()
                    .map(|t| t.id(aliases::TASK_ID))
                    .transpose()?
                    .flatten(),
            };
            Ok(TaskIntent::Delete(TaskTarget {
                tasklist_id,
                task_id,
                title: f
                    .text(aliases::TASK_TARGET_TITLE)
                    .or_else(|| nested.as_ref().and_then(|t| t.text(&["title"]))),
            }))
        }
        "list" => Ok(TaskIntent::List(TaskListing {
            tasklist_id,
            filter: f.text(aliases::TASK_FILTER),
        })),
        other => Err(f.unknown(other)),
    }
}

// ============================================================================
// FIELD ACCESS
// ============================================================================

#[derive(Clone, Copy)]
enum Bound {
    StartOfDay,
    EndOfDay,
}

#[derive(Clone)]
struct Fields<'a> {
    map: &'a Map<String, Value>,
    raw: &'a str,
    ctx: &'a DateContext,
}

impl<'a> Fields<'a> {
    fn invalid(&self, detail: impl Into<String>) -> ParseError {
        ParseError::invalid(self.raw, detail)
    }

    fn unknown(&self, action: &str) -> ParseError {
        ParseError::unknown_action(self.raw, format!("unsupported action '{}'", action))
    }

    fn object(&self, name: &str) -> Option<Fields<'a>> {
        match self.map.get(name) {
            Some(Value::Object(map)) => Some(Fields {
                map,
                raw: self.raw,
                ctx: self.ctx,
            }),
            _ => None,
        }
    }

    /// First non-empty string (or number) among `names`.
    fn text(&self, names: &[&str]) -> Option<String> {
        names.iter().find_map(|name| match self.map.get(*name) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }

    /// Like `text`, but the value must name exactly one remote resource.
    fn id(&self, names: &[&str]) -> Result<Option<String>, ParseError> {
        match self.text(names) {
            Some(id) if !is_path_segment(&id) => {
                Err(self.invalid(format!("'{}' is not a valid id", id)))
            }
            other => Ok(other),
        }
    }

    fn number(&self, names: &[&str]) -> Result<Option<u32>, ParseError> {
        for name in names {
            match self.map.get(*name) {
                None | Some(Value::Null) => continue,
                Some(Value::Number(n)) => {
                    let value = n
                        .as_u64()
                        .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
                        .and_then(|v| u32::try_from(v).ok())
                        .ok_or_else(|| self.invalid(format!("{} must be a positive number", name)))?;
                    return Ok(Some(value));
                }
                Some(Value::String(s)) if s.trim().is_empty() => continue,
                Some(Value::String(s)) => {
                    let value = s
                        .trim()
                        .parse::<u32>()
                        .map_err(|_| self.invalid(format!("{} must be a number, got '{}'", name, s)))?;
                    return Ok(Some(value));
                }
                Some(other) => {
                    return Err(self.invalid(format!("{} must be a number, got {}", name, other)));
                }
            }
        }
        Ok(None)
    }

    /// A positive event length in minutes, at most a year.
    fn duration(&self, names: &[&str]) -> Result<Option<u32>, ParseError> {
        match self.number(names)? {
            Some(minutes) if minutes > MAX_DURATION_MINUTES => Err(self.invalid(format!(
                "duration of {} minutes is longer than a year",
                minutes
            ))),
            minutes => Ok(minutes.filter(|m| *m > 0)),
        }
    }

    fn flag(&self, names: &[&str]) -> Result<bool, ParseError> {
        for name in names {
            match self.map.get(*name) {
                None | Some(Value::Null) => continue,
                Some(Value::Bool(b)) => return Ok(*b),
                Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "yes" => return Ok(true),
                    "false" | "no" | "" => return Ok(false),
                    _ => return Err(self.invalid(format!("{} must be true or false", name))),
                },
                Some(other) => {
                    return Err(self.invalid(format!("{} must be a boolean, got {}", name, other)));
                }
            }
        }
        Ok(false)
    }

    /// Strings from an array, an array of `{email}` objects, or a comma-separated string.
    fn list(&self, names: &[&str]) -> Vec<String> {
        for name in names {
            let items: Vec<String> = match self.map.get(*name) {
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s.trim().to_string()),
                        Value::Object(obj) => obj
                            .get("email")
                            .and_then(Value::as_str)
                            .map(|s| s.trim().to_string()),
                        _ => None,
                    })
                    .filter(|s| !s.is_empty())
                    .collect(),
                Some(Value::String(s)) => s
                    .split(',')
                    .map(|part| part.trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect(),
                _ => Vec::new(),
            };
            if !items.is_empty() {
                return items;
            }
        }
        Vec::new()
    }

    /// Category as given, plus an explicit color or the category's mapped color.
    fn category_and_color(&self) -> (Option<String>, Option<String>) {
        let category = self.text(&["category"]);
        let color_id = self.text(aliases::COLOR_ID).or_else(|| {
            category
                .as_deref()
                .and_then(color_for_category)
                .map(str::to_string)
        });
        (category, color_id)
    }

    fn status(&self) -> Result<Option<TaskStatus>, ParseError> {
        match self.text(&["status"]) {
            Some(status) => status
                .parse::<TaskStatus>()
                .map(Some)
                .map_err(|e| self.invalid(e)),
            None => Ok(None),
        }
    }

    fn subtasks(&self) -> Vec<SubtaskDraft> {
        let Some(Value::Array(items)) = self.map.get("subtasks") else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| match item {
                Value::String(title) => Some(SubtaskDraft {
                    title: title.trim().to_string(),
                    notes: String::new(),
                }),
                Value::Object(map) => {
                    let sub = Fields {
                        map,
                        raw: self.raw,
                        ctx: self.ctx,
                    };
                    Some(SubtaskDraft {
                        title: sub.text(&["title"]).unwrap_or_default(),
                        notes: sub.text(&["notes"]).unwrap_or_default(),
                    })
                }
                _ => None,
            })
            .filter(|sub| !sub.title.is_empty())
            .collect()
    }

    fn date_and_time(&self, text: &str) -> Result<(NaiveDate, Option<NaiveTime>), ParseError> {
        resolve_date_and_time(text, self.ctx)
            .ok_or_else(|| self.invalid(format!("could not resolve date '{}'", text)))
    }

    fn time(&self, text: &str) -> Result<NaiveTime, ParseError> {
        resolve_time(text).ok_or_else(|| self.invalid(format!("could not resolve time '{}'", text)))
    }

    fn local(&self, date: NaiveDate, time: NaiveTime) -> Result<DateTime<FixedOffset>, ParseError> {
        at_local(date, time, self.ctx.offset())
            .ok_or_else(|| self.invalid(format!("{} {} does not exist locally", date, time)))
    }

    /// A date-time; bare dates land at 09:00 local.
    fn instant(&self, text: &str) -> Result<DateTime<FixedOffset>, ParseError> {
        let (date, time) = self.date_and_time(text)?;
        self.local(date, time.unwrap_or_else(default_time))
    }

    /// A range boundary; bare dates become the start of the day, or the start of
    /// the following day for upper bounds.
    fn bound(
        &self,
        names: &[&str],
        bound: Bound,
    ) -> Result<Option<DateTime<FixedOffset>>, ParseError> {
        let Some(text) = self.text(names) else {
            return Ok(None);
        };
        let (date, time) = self.date_and_time(&text)?;
        let instant = match (time, bound) {
            (Some(time), _) => self.local(date, time)?,
            (None, Bound::StartOfDay) => self.local(date, NaiveTime::MIN)?,
            (None, Bound::EndOfDay) => self.local(date + Duration::days(1), NaiveTime::MIN)?,
        };
        Ok(Some(instant))
    }
}

// ============================================================================
// DATE / TIME RESOLUTION
// ============================================================================

pub(crate) fn default_time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN)
}

pub(crate) fn at_local(
    date: NaiveDate,
    time: NaiveTime,
    offset: FixedOffset,
) -> Option<DateTime<FixedOffset>> {
    offset.from_local_datetime(&date.and_time(time)).single()
}

/// Resolve a date phrase, keeping any time of day it carried.
pub fn resolve_date_and_time(
    text: &str,
    ctx: &DateContext,
) -> Option<(NaiveDate, Option<NaiveTime>)> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        let local = dt.with_timezone(&ctx.offset());
        return Some((local.date_naive(), Some(local.time())));
    }

    for pattern in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, pattern) {
            return Some((naive.date(), Some(naive.time())));
        }
    }

    if let Some(caps) = DATE_THEN_TIME.captures(text) {
        if let (Some(date), Some(time)) = (resolve_date(&caps[1], ctx), resolve_time(&caps[2])) {
            return Some((date, Some(time)));
        }
    }

    resolve_date(text, ctx).map(|date| (date, None))
}

/// Resolve a calendar date: ISO forms, today/tomorrow, weekday names, then free text.
pub fn resolve_date(text: &str, ctx: &DateContext) -> Option<NaiveDate> {
    let lower = text.trim().to_lowercase();

    match lower.as_str() {
        "today" | "tonight" | "now" => return Some(ctx.anchor_date),
        "tomorrow" => return Some(ctx.tomorrow_date),
        "yesterday" => return Some(ctx.anchor_date - Duration::days(1)),
        "day after tomorrow" | "the day after tomorrow" => {
            return Some(ctx.anchor_date + Duration::days(2));
        }
        "next week" | "in a week" => return Some(ctx.anchor_date + Duration::days(7)),
        // same day next month, clamped to the month's last day
        "next month" | "in a month" => return ctx.anchor_date.checked_add_months(Months::new(1)),
        "next year" | "in a year" => return ctx.anchor_date.checked_add_months(Months::new(12)),
        _ => {}
    }

    if let Some(caps) = ISO_DATE.captures(&lower) {
        let year = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let day = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = WEEKDAY.captures(&lower) {
        if let Some(weekday) = weekday_from_prefix(&caps[2]) {
            let strictly_after = caps.get(1).is_some_and(|m| m.as_str() == "next");
            return Some(next_weekday(ctx.anchor_date, weekday, strictly_after));
        }
    }

    parse_date_string(text.trim(), ctx.now, Dialect::Us)
        .ok()
        .map(|dt| dt.date_naive())
}

/// "15:00", "3pm", "3:30 p.m.", "noon".
pub fn resolve_time(text: &str) -> Option<NaiveTime> {
    let lower = text.trim().to_lowercase();
    match lower.as_str() {
        "noon" | "midday" => return NaiveTime::from_hms_opt(12, 0, 0),
        "midnight" => return Some(NaiveTime::MIN),
        _ => {}
    }

    let caps = CLOCK_TIME.captures(&lower)?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
    let second: u32 = caps.get(3).map_or(Some(0), |m| m.as_str().parse().ok())?;
    let is_pm = caps.get(4).map(|m| m.as_str().starts_with('p'));

    if is_pm.is_some() && !(1..=12).contains(&hour) {
        return None;
    }
    NaiveTime::from_hms_opt(resolve_24h(hour, is_pm), minute, second)
}

fn resolve_24h(hour: u32, is_pm: Option<bool>) -> u32 {
    match (hour, is_pm) {
        (12, Some(true)) => 12, // 12 pm is noon
        (12, Some(false)) => 0, // 12 am is midnight
        (h, Some(true)) => h + 12,
        (h, _) => h,
    }
}

fn weekday_from_prefix(prefix: &str) -> Option<Weekday> {
    match &prefix[..3] {
        "mon" => Some(Weekday::Mon),
        "tue" => Some(Weekday::Tue),
        "wed" => Some(Weekday::Wed),
        "thu" => Some(Weekday::Thu),
        "fri" => Some(Weekday::Fri),
        "sat" => Some(Weekday::Sat),
        "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Next `target` on or after `anchor`; strictly after when `strictly_after`.
fn next_weekday(anchor: NaiveDate, target: Weekday, strictly_after: bool) -> NaiveDate {
    let from = anchor.weekday().num_days_from_monday() as i64;
    let to = target.num_days_from_monday() as i64;
    let mut ahead = (to - from).rem_euclid(7);
    if ahead == 0 && strictly_after {
        ahead = 7;
    }
    anchor + Duration::days(ahead)
}

/// Month name, abbreviation, or 1-based number.
fn parse_month(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().filter(|m| (1..=12).contains(m)).map(|m| m as u32),
        Value::String(s) => {
            let lower = s.trim().to_lowercase();
            if let Ok(number) = lower.parse::<u32>() {
                return (1..=12).contains(&number).then_some(number);
            }
            if lower.len() < 3 {
                return None;
            }
            MONTHS
                .iter()
                .position(|name| name.starts_with(lower.as_str()))
                .map(|index| index as u32 + 1)
        }
        _ => None,
    }
}
