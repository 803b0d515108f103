//! Building Google Calendar event payloads from time entries.

use chrono::{DateTime, Duration, Utc};
use togglsync_shared::{TimeEntry, RUNNING_COLOR_ID};

/// Everything needed to create or update a calendar event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPayload {
    pub ical_uid: String,
    pub summary: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub color_id: Option<String>,
}

/// Build the event payload for an entry.
///
/// Running entries get a one-minute placeholder duration and are always
/// rendered in grey; the resolved color applies once the entry is stopped.
pub fn build_event_payload(
    entry: &TimeEntry,
    project_name: Option<&str>,
    tag_names: &[String],
    color_id: Option<String>,
) -> EventPayload {
    let mut desc_lines = vec![format!("Toggl Entry: {}", entry.toggl_id)];
    if let Some(project) = project_name {
        desc_lines.push(format!("Project: {}", project));
    }
    if !tag_names.is_empty() {
        desc_lines.push(format!("Tags: {}", tag_names.join(", ")));
    }

    let end = entry
        .end_time
        .unwrap_or_else(|| entry.start_time + Duration::minutes(1));

    let color_id = if entry.is_running() {
        Some(RUNNING_COLOR_ID.to_string())
    } else {
        color_id
    };

    let summary = if entry.description.is_empty() {
        "(No description)".to_string()
    } else {
        entry.description.clone()
    };

    EventPayload {
        ical_uid: entry.ical_uid(),
        summary,
        description: desc_lines.join("\n"),
        start: entry.start_time,
        end,
        color_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn entry(toggl_id: i64) -> TimeEntry {
        let now = Utc::now();
        TimeEntry {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            toggl_id,
            description: "Work".to_string(),
            start_time: now - Duration::hours(1),
            end_time: Some(now),
            project_id: None,
            workspace_id: None,
            tag_ids: vec![],
            calendar_id: None,
            google_event_id: None,
            synced: false,
            pending_deletion: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn basic_fields() {
        let e = entry(700);
        let payload = build_event_payload(&e, None, &[], None);
        assert_eq!(payload.summary, "Work");
        assert_eq!(payload.ical_uid, "toggl700");
        assert!(payload.description.contains("Toggl Entry: 700"));
        assert_eq!(payload.end, e.end_time.unwrap());
    }

    #[test]
    fn project_and_tags_in_description() {
        let e = entry(701);
        let payload = build_event_payload(
            &e,
            Some("ProjX"),
            &["urgent".to_string(), "billable".to_string()],
            None,
        );
        assert!(payload.description.contains("Project: ProjX"));
        assert!(payload.description.contains("Tags: urgent, billable"));
    }

    #[test]
    fn running_entry_grey_with_placeholder_end() {
        let mut e = entry(702);
        e.end_time = None;
        let payload = build_event_payload(&e, None, &[], Some("5".to_string()));
        assert_eq!(payload.color_id.as_deref(), Some("8"));
        assert_eq!(payload.end, e.start_time + Duration::minutes(1));
    }

    #[test]
    fn finished_entry_uses_resolved_color() {
        let e = entry(703);
        let payload = build_event_payload(&e, None, &[], Some("5".to_string()));
        assert_eq!(payload.color_id.as_deref(), Some("5"));
    }

    #[test]
    fn empty_description_gets_placeholder() {
        let mut e = entry(704);
        e.description = String::new();
        let payload = build_event_payload(&e, None, &[], None);
        assert_eq!(payload.summary, "(No description)");
    }
}
