//! Google Calendar API v3, primary calendar only.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{CalendarApi, RemoteError, check_status, endpoint, http_client};

pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Upper bound the API accepts for a single listing page.
const MAX_PAGE_SIZE: u32 = 2500;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<EventTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<EventTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<Attendee>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminders: Option<Reminders>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Everything else Google sent (recurrence, conferenceData, visibility, ...).
    /// Updates are full PUTs, so these ride along untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventResource {
    pub fn summary_contains(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        self.summary
            .as_deref()
            .is_some_and(|s| s.to_lowercase().contains(&needle))
    }
}

/// Either a timed instant or an all-day date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventTime {
    pub fn at(instant: DateTime<FixedOffset>, time_zone: &str) -> Self {
        Self {
            date_time: Some(instant),
            date: None,
            time_zone: Some(time_zone.to_string()),
        }
    }

    /// The instant in `offset`; all-day dates start at local midnight.
    pub fn instant(&self, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
        match (self.date_time, self.date) {
            (Some(dt), _) => Some(dt.with_timezone(&offset)),
            (None, Some(date)) => offset
                .from_local_datetime(&date.and_time(NaiveTime::MIN))
                .single(),
            (None, None) => None,
        }
    }

    pub fn is_all_day(&self) -> bool {
        self.date_time.is_none() && self.date.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Attendee {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            response_status: None,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminders {
    #[serde(default)]
    pub use_default: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<serde_json::Value>,
}

impl Default for Reminders {
    fn default() -> Self {
        Self {
            use_default: true,
            overrides: Vec::new(),
        }
    }
}

/// Listing window. Results are expanded single events ordered by start time.
#[derive(Debug, Clone, PartialEq)]
pub struct EventWindow {
    pub time_min: Option<DateTime<FixedOffset>>,
    pub time_max: Option<DateTime<FixedOffset>>,
    pub query: Option<String>,
    pub max_results: u32,
}

impl Default for EventWindow {
    fn default() -> Self {
        Self {
            time_min: None,
            time_max: None,
            query: None,
            max_results: 500,
        }
    }
}

impl EventWindow {
    pub fn between(time_min: DateTime<FixedOffset>, time_max: DateTime<FixedOffset>) -> Self {
        Self {
            time_min: Some(time_min),
            time_max: Some(time_max),
            ..Self::default()
        }
    }

    fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
            ("showDeleted", "false".to_string()),
            (
                "maxResults",
                self.max_results.clamp(1, MAX_PAGE_SIZE).to_string(),
            ),
        ];
        if let Some(min) = self.time_min {
            params.push(("timeMin", min.to_rfc3339()));
        }
        if let Some(max) = self.time_max {
            params.push(("timeMax", max.to_rfc3339()));
        }
        if let Some(q) = &self.query {
            params.push(("q", q.clone()));
        }
        params
    }
}

#[derive(Deserialize)]
struct EventsResponse {
    #[serde(default)]
    items: Vec<EventResource>,
}

pub struct GoogleCalendar {
    client: Client,
    access_token: String,
    base_url: String,
    calendar_id: String,
}

impl GoogleCalendar {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            access_token: access_token.into(),
            base_url: CALENDAR_API_BASE.to_string(),
            calendar_id: "primary".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn events_url(&self) -> Result<Url, RemoteError> {
        endpoint(&self.base_url, &["calendars", &self.calendar_id, "events"])
    }

    fn event_url(&self, event_id: &str) -> Result<Url, RemoteError> {
        endpoint(
            &self.base_url,
            &["calendars", &self.calendar_id, "events", event_id],
        )
    }
}

#[async_trait]
impl CalendarApi for GoogleCalendar {
    async fn list_events(&self, window: &EventWindow) -> Result<Vec<EventResource>, RemoteError> {
        let response = self
            .client
            .get(self.events_url()?)
            .bearer_auth(&self.access_token)
            .query(&window.query_params())
            .send()
            .await?;
        let response = check_status(response, "calendar").await?;

        let body: EventsResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(format!("calendar events: {}", e)))?;
        Ok(body.items)
    }

    async fn get_event(&self, event_id: &str) -> Result<EventResource, RemoteError> {
        let response = self
            .client
            .get(self.event_url(event_id)?)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let response = check_status(response, &format!("event {}", event_id)).await?;
        response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(format!("event {}: {}", event_id, e)))
    }

    async fn insert_event(&self, event: &EventResource) -> Result<EventResource, RemoteError> {
        let response = self
            .client
            .post(self.events_url()?)
            .bearer_auth(&self.access_token)
            .json(event)
            .send()
            .await?;
        let response = check_status(response, "calendar").await?;
        response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(format!("created event: {}", e)))
    }

    async fn update_event(
        &self,
        event_id: &str,
        event: &EventResource,
    ) -> Result<EventResource, RemoteError> {
        let response = self
            .client
            .put(self.event_url(event_id)?)
            .bearer_auth(&self.access_token)
            .json(event)
            .send()
            .await?;
        let response = check_status(response, &format!("event {}", event_id)).await?;
        response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(format!("updated event: {}", e)))
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), RemoteError> {
        let response = self
            .client
            .delete(self.event_url(event_id)?)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        check_status(response, &format!("event {}", event_id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GoogleCalendar {
        GoogleCalendar::new("token-123").with_base_url(format!("{}/calendar/v3", server.uri()))
    }

    #[tokio::test]
    async fn list_events_sends_window_and_ordering() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/calendar/v3/calendars/primary/events"))
            .and(header("Authorization", "Bearer token-123"))
            .and(query_param("singleEvents", "true"))
            .and(query_param("orderBy", "startTime"))
            .and(query_param("timeMin", "2024-06-10T00:00:00+05:30"))
            .and(query_param("q", "standup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {
                        "id": "evt1",
                        "summary": "Standup",
                        "start": { "dateTime": "2024-06-10T09:30:00+05:30" },
                        "end": { "dateTime": "2024-06-10T09:45:00+05:30" },
                        "htmlLink": "https://calendar.google.com/event?eid=evt1"
                    },
                    {
                        "id": "evt2",
                        "summary": "Holiday",
                        "start": { "date": "2024-06-11" },
                        "end": { "date": "2024-06-12" }
                    }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let window = EventWindow {
            time_min: DateTime::parse_from_rfc3339("2024-06-10T00:00:00+05:30").ok(),
            query: Some("standup".into()),
            ..EventWindow::default()
        };
        let events = client(&server).list_events(&window).await.unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id.as_deref(), Some("evt1"));
        assert!(events[0].summary_contains("STAND"));
        assert!(events[1].start.as_ref().unwrap().is_all_day());
    }

    #[tokio::test]
    async fn insert_event_posts_resource() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/calendar/v3/calendars/primary/events"))
            .and(body_partial_json(json!({
                "summary": "team sync",
                "start": { "dateTime": "2024-06-11T15:00:00+05:30", "timeZone": "Asia/Kolkata" },
                "reminders": { "useDefault": true }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "new1",
                "summary": "team sync",
                "htmlLink": "https://calendar.google.com/event?eid=new1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let start = DateTime::parse_from_rfc3339("2024-06-11T15:00:00+05:30").unwrap();
        let event = EventResource {
            summary: Some("team sync".into()),
            start: Some(EventTime::at(start, "Asia/Kolkata")),
            end: Some(EventTime::at(start + chrono::Duration::minutes(30), "Asia/Kolkata")),
            reminders: Some(Reminders::default()),
            ..EventResource::default()
        };

        let created = client(&server).insert_event(&event).await.unwrap();
        assert_eq!(
            created.html_link.as_deref(),
            Some("https://calendar.google.com/event?eid=new1")
        );
    }

    #[test]
    fn unmodelled_fields_survive_a_round_trip() {
        let original = json!({
            "id": "e1",
            "summary": "Standup",
            "recurrence": ["RRULE:FREQ=WEEKLY;BYDAY=MO"],
            "visibility": "private",
            "conferenceData": { "entryPoints": [{ "uri": "https://meet.google.com/abc" }] },
            "attendees": [{ "email": "a@x.com", "displayName": "Ana", "optional": true }]
        });

        let event: EventResource = serde_json::from_value(original.clone()).unwrap();
        assert_eq!(event.attendees.as_ref().unwrap()[0].extra["displayName"], "Ana");
        assert_eq!(serde_json::to_value(&event).unwrap(), original);
    }

    #[tokio::test]
    async fn missing_event_maps_to_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/calendar/v3/calendars/primary/events/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "code": 404, "message": "Not Found" }
            })))
            .mount(&server)
            .await;

        let err = client(&server).delete_event("gone").await.unwrap_err();
        assert!(matches!(err, RemoteError::NotFound(_)));
    }

    #[tokio::test]
    async fn expired_token_is_unauthorized() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/calendar/v3/calendars/primary/events/e1"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client(&server).get_event("e1").await.unwrap_err();
        assert!(matches!(err, RemoteError::Unauthorized));
    }

    #[tokio::test]
    async fn api_rejection_carries_google_message() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/calendar/v3/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "code": 400, "message": "Invalid start time." }
            })))
            .mount(&server)
            .await;

        match client(&server).insert_event(&EventResource::default()).await {
            Err(RemoteError::Api { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid start time.");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn all_day_dates_start_at_local_midnight() {
        let offset = FixedOffset::east_opt(19800).unwrap();
        let time = EventTime {
            date: NaiveDate::from_ymd_opt(2024, 6, 11),
            ..EventTime::default()
        };
        assert_eq!(
            time.instant(offset).unwrap().to_rfc3339(),
            "2024-06-11T00:00:00+05:30"
        );
    }
}
