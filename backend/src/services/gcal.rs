//! Google Calendar API client for mirroring time entries as events.

use google_calendar3::api::{Calendar, CalendarListEntry, Event, EventDateTime};
use google_calendar3::hyper_rustls::HttpsConnector;
use google_calendar3::CalendarHub;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;

use crate::sync::event::EventPayload;

#[derive(Debug, Error)]
pub enum GoogleCalendarError {
    #[error("google calendar not connected")]
    NotConnected,

    #[error("failed to build google authenticator: {0}")]
    Auth(String),

    #[error("google calendar api error: {0}")]
    Api(#[from] google_calendar3::Error),
}

/// A calendar as listed by the Google Calendar API.
#[derive(Debug, Clone)]
pub struct CalendarListing {
    pub id: String,
    pub summary: String,
    pub access_role: String,
    pub primary: bool,
}

impl CalendarListing {
    /// Only calendars the user can write to are worth importing.
    pub fn writable(&self) -> bool {
        matches!(self.access_role.as_str(), "owner" | "writer")
    }
}

/// Client for interacting with the Google Calendar API on behalf of one user.
pub struct GoogleCalendarClient {
    hub: CalendarHub<HttpsConnector<HttpConnector>>,
    timezone: String,
}

impl GoogleCalendarClient {
    /// Build a client from a stored OAuth refresh token.
    ///
    /// Token refresh is handled by the authenticator; an expired access
    /// token is replaced transparently on the next API call.
    pub async fn from_refresh_token(
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
        timezone: &str,
    ) -> Result<Self, GoogleCalendarError> {
        // Use the yup_oauth2 re-exported by google_calendar3 to avoid version mismatch
        let secret = google_calendar3::yup_oauth2::authorized_user::AuthorizedUserSecret {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            refresh_token: refresh_token.to_string(),
            key_type: "authorized_user".to_string(),
        };

        let auth = google_calendar3::yup_oauth2::AuthorizedUserAuthenticator::builder(secret)
            .build()
            .await
            .map_err(|e| GoogleCalendarError::Auth(e.to_string()))?;

        let connector = google_calendar3::hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| GoogleCalendarError::Auth(e.to_string()))?
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(connector);
        let hub = CalendarHub::new(client, auth);

        Ok(Self {
            hub,
            timezone: timezone.to_string(),
        })
    }

    pub async fn list_calendars(&self) -> Result<Vec<CalendarListing>, GoogleCalendarError> {
        let (_, calendar_list) = self.hub.calendar_list().list().doit().await?;

        let listings = calendar_list
            .items
            .unwrap_or_default()
            .into_iter()
            .filter_map(parse_listing)
            .collect();

        Ok(listings)
    }

    pub async fn get_calendar(
        &self,
        calendar_id: &str,
    ) -> Result<Option<Calendar>, GoogleCalendarError> {
        match self.hub.calendars().get(calendar_id).doit().await {
            Ok((_, calendar)) => Ok(Some(calendar)),
            Err(e) if error_status(&e) == Some(404) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Create a dedicated calendar, returning its Google calendar id.
    pub async fn insert_calendar(
        &self,
        summary: &str,
        description: &str,
    ) -> Result<String, GoogleCalendarError> {
        let calendar = Calendar {
            summary: Some(summary.to_string()),
            description: Some(description.to_string()),
            time_zone: Some(self.timezone.clone()),
            ..Default::default()
        };

        let (_, created) = self.hub.calendars().insert(calendar).doit().await?;

        Ok(created.id.unwrap_or_default())
    }

    /// Insert an event. A 409 on the iCalUID means the event already exists
    /// (e.g. a replayed webhook); it is looked up and returned instead.
    pub async fn insert_event(
        &self,
        calendar_id: &str,
        payload: &EventPayload,
    ) -> Result<Event, GoogleCalendarError> {
        let event = self.to_google_event(payload);

        match self.hub.events().insert(event, calendar_id).doit().await {
            Ok((_, created)) => Ok(created),
            Err(e) if error_status(&e) == Some(409) => {
                tracing::warn!(
                    "Event with iCalUID {} already exists, finding it",
                    payload.ical_uid
                );
                self.find_event_by_ical_uid(calendar_id, &payload.ical_uid)
                    .await?
                    .ok_or(GoogleCalendarError::Api(e))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn patch_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        payload: &EventPayload,
    ) -> Result<Event, GoogleCalendarError> {
        let event = self.to_google_event(payload);

        let (_, updated) = self
            .hub
            .events()
            .patch(event, calendar_id, event_id)
            .doit()
            .await?;

        Ok(updated)
    }

    /// Delete an event; an already-deleted event is not an error.
    pub async fn delete_event(
        &self,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<(), GoogleCalendarError> {
        match self.hub.events().delete(calendar_id, event_id).doit().await {
            Ok(_) => Ok(()),
            Err(e) if error_status(&e) == Some(404) || error_status(&e) == Some(410) => {
                tracing::warn!("Event {} not found, may already be deleted", event_id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Find an event by its iCalUID, the stable identity shared with Toggl.
    pub async fn find_event_by_ical_uid(
        &self,
        calendar_id: &str,
        ical_uid: &str,
    ) -> Result<Option<Event>, GoogleCalendarError> {
        let (_, events) = self
            .hub
            .events()
            .list(calendar_id)
            .i_cal_uid(ical_uid)
            .doit()
            .await?;

        Ok(events.items.unwrap_or_default().into_iter().next())
    }

    fn to_google_event(&self, payload: &EventPayload) -> Event {
        Event {
            summary: Some(payload.summary.clone()),
            description: Some(payload.description.clone()),
            i_cal_uid: Some(payload.ical_uid.clone()),
            color_id: payload.color_id.clone(),
            start: Some(EventDateTime {
                date_time: Some(payload.start),
                time_zone: Some(self.timezone.clone()),
                ..Default::default()
            }),
            end: Some(EventDateTime {
                date_time: Some(payload.end),
                time_zone: Some(self.timezone.clone()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

fn parse_listing(entry: CalendarListEntry) -> Option<CalendarListing> {
    Some(CalendarListing {
        id: entry.id?,
        summary: entry.summary.unwrap_or_default(),
        access_role: entry.access_role.unwrap_or_default(),
        primary: entry.primary.unwrap_or(false),
    })
}

/// Extract the HTTP status from a google API error, whichever variant the
/// generated client chose to surface it through.
fn error_status(err: &google_calendar3::Error) -> Option<u16> {
    match err {
        google_calendar3::Error::Failure(response) => Some(response.status().as_u16()),
        google_calendar3::Error::BadRequest(value) => value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|c| c.as_u64())
            .map(|c| c as u16),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writable_roles() {
        let mut listing = CalendarListing {
            id: "cal".to_string(),
            summary: "Cal".to_string(),
            access_role: "owner".to_string(),
            primary: false,
        };
        assert!(listing.writable());

        listing.access_role = "writer".to_string();
        assert!(listing.writable());

        listing.access_role = "reader".to_string();
        assert!(!listing.writable());
    }

    #[test]
    fn bad_request_status_extracted() {
        let err = google_calendar3::Error::BadRequest(serde_json::json!({
            "error": {"code": 404, "message": "Not Found"}
        }));
        assert_eq!(error_status(&err), Some(404));
    }
}
