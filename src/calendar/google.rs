//! Google Calendar free/busy client.
//!
//! Only availability is queried here; the requester picks and confirms a slot
//! through the booking page. The bearer token is supplied by configuration.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calendar::slots::{BusinessHours, Slot, TimeRange, free_slots};
use crate::calendar::{CalendarClient, booking_link};
use crate::classifier::AppointmentType;
use crate::config::{EnvLookup, parse_or, parse_within, required};
use crate::error::{CalendarError, ConfigError};

const DEFAULT_API_URL: &str = "https://www.googleapis.com/calendar/v3";
const DEFAULT_BOOKING_URL: &str = "http://localhost:3000/book";
const MAX_LOOKAHEAD_DAYS: u32 = 366;

/// Calendar configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct CalendarConfig {
    pub api_url: String,
    pub calendar_id: String,
    pub access_token: SecretString,
    pub booking_base_url: String,
    pub lookahead_days: u32,
    pub slot_minutes: u32,
    pub hours: BusinessHours,
}

impl CalendarConfig {
    pub fn from_vars(vars: EnvLookup<'_>) -> Result<Self, ConfigError> {
        let hours = BusinessHours {
            open_hour: parse_or(vars, "BUSINESS_OPEN_HOUR", 9)?,
            close_hour: parse_or(vars, "BUSINESS_CLOSE_HOUR", 17)?,
        };
        if hours.open_hour >= hours.close_hour || hours.close_hour > 24 {
            return Err(ConfigError::InvalidValue {
                key: "BUSINESS_CLOSE_HOUR".into(),
                message: format!(
                    "business hours {}..{} are not a valid range",
                    hours.open_hour, hours.close_hour
                ),
            });
        }

        Ok(Self {
            api_url: vars("GOOGLE_CALENDAR_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            calendar_id: vars("CALENDAR_ID").unwrap_or_else(|| "primary".to_string()),
            access_token: SecretString::from(required(vars, "GOOGLE_CALENDAR_TOKEN")?),
            booking_base_url: vars("BOOKING_APP_URL").unwrap_or_else(|| DEFAULT_BOOKING_URL.to_string()),
            lookahead_days: parse_within(vars, "CALENDAR_LOOKAHEAD_DAYS", 7, 1..=MAX_LOOKAHEAD_DAYS)?,
            slot_minutes: parse_within(vars, "SLOT_MINUTES", 60, 1..=24 * 60)?,
            hours,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FreeBusyRequest<'a> {
    time_min: String,
    time_max: String,
    items: Vec<FreeBusyItem<'a>>,
}

#[derive(Debug, Serialize)]
struct FreeBusyItem<'a> {
    id: &'a str,
}

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: HashMap<String, CalendarBusy>,
}

#[derive(Debug, Deserialize)]
struct CalendarBusy {
    #[serde(default)]
    busy: Vec<TimeRange>,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

/// Extract the busy periods of `calendar_id` from a free/busy response body.
fn parse_busy(body: &str, calendar_id: &str) -> Result<Vec<TimeRange>, CalendarError> {
    let response: FreeBusyResponse =
        serde_json::from_str(body).map_err(|e| CalendarError::InvalidResponse {
            reason: format!("free/busy JSON: {e}"),
        })?;

    let calendar = response
        .calendars
        .get(calendar_id)
        .ok_or_else(|| CalendarError::InvalidResponse {
            reason: format!("calendar '{calendar_id}' missing from response"),
        })?;

    if let Some(err) = calendar.errors.first() {
        return Err(CalendarError::unavailable(format!(
            "calendar '{calendar_id}' reported: {err}"
        )));
    }
    Ok(calendar.busy.clone())
}

/// Google Calendar over HTTPS.
pub struct GoogleCalendar {
    config: CalendarConfig,
    http: reqwest::Client,
}

impl GoogleCalendar {
    pub fn new(config: CalendarConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    async fn query_busy(&self, range: TimeRange) -> Result<Vec<TimeRange>, CalendarError> {
        let request = FreeBusyRequest {
            time_min: range.start.to_rfc3339(),
            time_max: range.end.to_rfc3339(),
            items: vec![FreeBusyItem {
                id: &self.config.calendar_id,
            }],
        };

        let response = self
            .http
            .post(format!("{}/freeBusy", self.config.api_url.trim_end_matches('/')))
            .bearer_auth(self.config.access_token.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| CalendarError::unavailable(format!("free/busy request: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(CalendarError::unavailable(format!(
                "calendar rejected credentials ({status})"
            )));
        }
        if !status.is_success() {
            return Err(CalendarError::unavailable(format!("free/busy returned {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CalendarError::unavailable(format!("free/busy body: {e}")))?;
        parse_busy(&body, &self.config.calendar_id)
    }
}

#[async_trait]
impl CalendarClient for GoogleCalendar {
    async fn check_availability(&self, range: Option<TimeRange>) -> Result<Vec<Slot>, CalendarError> {
        let range = range.unwrap_or_else(|| TimeRange::upcoming(Utc::now(), self.config.lookahead_days));
        let busy = self.query_busy(range).await?;
        let slots = free_slots(
            range,
            &busy,
            Duration::minutes(i64::from(self.config.slot_minutes)),
            self.config.hours,
        );
        debug!(busy = busy.len(), free = slots.len(), "Availability checked");
        Ok(slots)
    }

    async fn make_booking_link(
        &self,
        slot: Option<&Slot>,
        kind: AppointmentType,
    ) -> Result<String, CalendarError> {
        booking_link(&self.config.booking_base_url, slot, kind)
    }
}
