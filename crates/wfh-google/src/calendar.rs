//! Google Calendar API client.
//!
//! Only what `wfh` needs: inserting an all-day event and listing the
//! calendars the account can see.

use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use wfh_core::WorkFromHomeEvent;

use crate::client::AuthenticatedClient;
use crate::error::{GoogleError, GoogleResult};

/// Base URL for Google Calendar API v3.
const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Google Calendar API client.
#[derive(Debug)]
pub struct CalendarClient {
    auth: AuthenticatedClient,
    base_url: String,
}

impl CalendarClient {
    /// Creates a client talking to the public Calendar API.
    pub fn new(auth: AuthenticatedClient) -> Self {
        Self {
            auth,
            base_url: CALENDAR_API_BASE.to_string(),
        }
    }

    /// Points the client at another API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Creates `event` as an all-day event on `calendar_id`.
    pub async fn insert_event(
        &self,
        calendar_id: &str,
        event: &WorkFromHomeEvent,
    ) -> GoogleResult<CreatedEvent> {
        let url = format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(calendar_id)
        );
        let body = serde_json::to_string(&EventInsert::from(event))
            .map_err(|e| GoogleError::Internal(format!("failed to serialize event: {}", e)))?;
        debug!("inserting event {} into calendar {}", body, calendar_id);

        let response = self
            .auth
            .post(&url)
            .await?
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(request_error)?;

        let created: CreatedEvent = parse_json(response).await?;
        debug!("created event {}", created.id);
        Ok(created)
    }

    /// Lists available calendars.
    pub async fn list_calendars(&self) -> GoogleResult<Vec<CalendarListEntry>> {
        let url = format!("{}/users/me/calendarList", self.base_url);
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.auth.get(&url).await?;
            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let response = request.send().await.map_err(request_error)?;
            let page: CalendarListResponse = parse_json(response).await?;
            calendars.extend(page.items);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(calendars)
    }
}

fn request_error(e: reqwest::Error) -> GoogleError {
    if e.is_timeout() {
        GoogleError::Network("request timeout".to_string())
    } else if e.is_connect() {
        GoogleError::Network(format!("connection failed: {}", e))
    } else {
        GoogleError::Network(format!("request failed: {}", e))
    }
}

async fn parse_json<T: for<'de> Deserialize<'de>>(response: Response) -> GoogleResult<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| GoogleError::Network(format!("failed to read response: {}", e)))?;

    if !status.is_success() {
        let body = match status {
            StatusCode::UNAUTHORIZED => format!("access token expired or invalid: {}", body),
            StatusCode::FORBIDDEN => format!("access denied to calendar: {}", body),
            _ => body,
        };
        return Err(GoogleError::Api {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body)
        .map_err(|e| GoogleError::InvalidResponse(format!("failed to parse response: {}", e)))
}

/// Request body for `events.insert`.
#[derive(Debug, Serialize)]
struct EventInsert {
    summary: String,
    start: EventDate,
    end: EventDate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventDate {
    date: String,
    time_zone: String,
}

impl From<&WorkFromHomeEvent> for EventInsert {
    fn from(event: &WorkFromHomeEvent) -> Self {
        let date = |d: chrono::NaiveDate| EventDate {
            date: d.format("%Y-%m-%d").to_string(),
            time_zone: event.time_zone.clone(),
        };
        Self {
            summary: event.summary.clone(),
            start: date(event.start_date()),
            end: date(event.end_date()),
        }
    }
}

/// The event returned by `events.insert`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEvent {
    /// The event ID.
    pub id: String,
    /// Link to the event in the Calendar web UI.
    #[serde(default)]
    pub html_link: Option<String>,
    /// The event title.
    #[serde(default)]
    pub summary: Option<String>,
    /// Event status (`confirmed`, `tentative`, `cancelled`).
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarListResponse {
    #[serde(default)]
    items: Vec<CalendarListEntry>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// A calendar from the calendar list.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarListEntry {
    /// The calendar ID.
    pub id: String,
    /// The calendar summary (name).
    #[serde(default)]
    pub summary: String,
    /// Whether this is the primary calendar.
    #[serde(default)]
    pub primary: bool,
    /// The user's access role (`owner`, `writer`, `reader`, ...).
    #[serde(default)]
    pub access_role: Option<String>,
    /// The calendar timezone.
    #[serde(default)]
    pub time_zone: Option<String>,
}

impl CalendarListEntry {
    /// Returns true if events can be created on this calendar.
    pub fn is_writable(&self) -> bool {
        matches!(self.access_role.as_deref(), Some("owner" | "writer"))
    }
}
