//! Calendar access: availability lookup and booking links.

pub mod google;
pub mod slots;

pub use google::{CalendarConfig, GoogleCalendar};
pub use slots::{BusinessHours, Slot, TimeRange};

use async_trait::async_trait;
use reqwest::Url;

use crate::classifier::AppointmentType;
use crate::error::CalendarError;

/// A booking link ready to be sent to the requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingAction {
    pub recipient: String,
    pub link: String,
    /// Slot the link points at, if one was free.
    pub slot: Option<Slot>,
}

/// Calendar operations consumed by the orchestrator.
#[async_trait]
pub trait CalendarClient: Send + Sync {
    /// Free slots within `range`, or within the client's default window.
    async fn check_availability(&self, range: Option<TimeRange>) -> Result<Vec<Slot>, CalendarError>;

    /// Booking URL for the given slot and appointment type.
    async fn make_booking_link(
        &self,
        slot: Option<&Slot>,
        kind: AppointmentType,
    ) -> Result<String, CalendarError>;
}

/// `{base}?type=<kind>[&start=<rfc3339>]`.
pub fn booking_link(
    base: &str,
    slot: Option<&Slot>,
    kind: AppointmentType,
) -> Result<String, CalendarError> {
    let mut url = Url::parse(base).map_err(|e| CalendarError::InvalidUrl(format!("{base}: {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("type", kind.as_str());
        if let Some(slot) = slot {
            query.append_pair("start", &slot.start.to_rfc3339());
        }
    }
    Ok(url.into())
}
