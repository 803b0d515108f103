//! Priority-based calendar and color resolution for time entries.
//!
//! Priority order (highest to lowest):
//! 1. Tags - if any tag has a mapping, the best-ranked one wins
//! 2. Project
//! 3. Workspace
//! 4. Organization (via the entry's workspace)
//! 5. Default calendar, with no color

use diesel_async::AsyncPgConnection;
use togglsync_shared::{Calendar, Mapping, MappingEntityType, TimeEntry};
use uuid::Uuid;

use crate::db;

/// The Toggl entities a time entry is attached to, as used for matching.
#[derive(Debug, Default)]
pub struct EntryEntities<'a> {
    pub tag_ids: &'a [i64],
    pub project_id: Option<i64>,
    pub workspace_id: Option<i64>,
    pub organization_id: Option<i64>,
}

/// Outcome of matching the mapping table against an entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRule {
    pub calendar_id: Option<Uuid>,
    pub color_id: Option<String>,
}

/// Where an entry's event should live and how it should look.
#[derive(Debug, Clone)]
pub struct ResolvedDestination {
    pub calendar: Calendar,
    pub color_id: Option<String>,
}

/// Match the mapping rules against an entry. `mappings` must be sorted by
/// ascending priority, as `db::mappings::list_for_user` returns them.
pub fn resolve_rule(mappings: &[Mapping], entities: &EntryEntities) -> Option<ResolvedRule> {
    if !entities.tag_ids.is_empty() {
        let tag_match = mappings.iter().find(|m| {
            m.entity_type == MappingEntityType::Tag && entities.tag_ids.contains(&m.entity_id)
        });
        if let Some(mapping) = tag_match {
            return Some(resolved(mapping));
        }
    }

    if let Some(project_id) = entities.project_id {
        let project_match = mappings
            .iter()
            .find(|m| m.entity_type == MappingEntityType::Project && m.entity_id == project_id);
        if let Some(mapping) = project_match {
            return Some(resolved(mapping));
        }
    }

    if let Some(workspace_id) = entities.workspace_id {
        let workspace_match = mappings
            .iter()
            .find(|m| m.entity_type == MappingEntityType::Workspace && m.entity_id == workspace_id);
        if let Some(mapping) = workspace_match {
            return Some(resolved(mapping));
        }
    }

    if let Some(organization_id) = entities.organization_id {
        let org_match = mappings.iter().find(|m| {
            m.entity_type == MappingEntityType::Organization && m.entity_id == organization_id
        });
        if let Some(mapping) = org_match {
            return Some(resolved(mapping));
        }
    }

    None
}

fn resolved(mapping: &Mapping) -> ResolvedRule {
    ResolvedRule {
        calendar_id: mapping.calendar_id,
        color_id: mapping.color_id.clone(),
    }
}

/// Resolve the destination calendar and color for a stored entry.
///
/// Returns None when neither a mapping nor a default calendar yields a
/// destination; such entries cannot be synced.
pub async fn resolve_destination(
    conn: &mut AsyncPgConnection,
    entry: &TimeEntry,
) -> anyhow::Result<Option<ResolvedDestination>> {
    let mappings = db::mappings::list_for_user(conn, entry.user_id).await?;

    // The organization is reachable only through the entry's workspace
    let mut organization_id = None;
    if let Some(ws_toggl_id) = entry.workspace_id {
        if let Some(workspace) =
            db::workspaces::find_by_toggl_id(conn, entry.user_id, ws_toggl_id).await?
        {
            if let Some(org_uuid) = workspace.organization_id {
                organization_id = Some(db::organizations::get_by_id(conn, org_uuid).await?.toggl_id);
            }
        }
    }

    let entities = EntryEntities {
        tag_ids: &entry.tag_ids,
        project_id: entry.project_id,
        workspace_id: entry.workspace_id,
        organization_id,
    };

    let rule = resolve_rule(&mappings, &entities);

    let default_calendar = db::calendars::get_default_for_user(conn, entry.user_id).await?;

    match rule {
        Some(rule) => {
            let calendar = match rule.calendar_id {
                Some(id) => db::calendars::find_by_id(conn, id).await?,
                None => None,
            };
            let calendar = calendar.or(default_calendar);
            match calendar {
                Some(calendar) => {
                    tracing::debug!(
                        "Resolved entry {} to calendar \"{}\" via mapping",
                        entry.toggl_id,
                        calendar.name
                    );
                    Ok(Some(ResolvedDestination {
                        calendar,
                        color_id: rule.color_id,
                    }))
                }
                None => Ok(None),
            }
        }
        None => match default_calendar {
            Some(calendar) => {
                tracing::debug!(
                    "Resolved entry {} to default calendar \"{}\"",
                    entry.toggl_id,
                    calendar.name
                );
                Ok(Some(ResolvedDestination {
                    calendar,
                    color_id: None,
                }))
            }
            None => Ok(None),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn mapping(
        entity_type: MappingEntityType,
        entity_id: i64,
        color_id: &str,
        priority: i32,
    ) -> Mapping {
        Mapping {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            entity_type,
            entity_id,
            entity_name: "x".to_string(),
            calendar_id: None,
            color_id: Some(color_id.to_string()),
            priority,
            updated_at: Utc::now(),
        }
    }

    fn sorted(mut mappings: Vec<Mapping>) -> Vec<Mapping> {
        mappings.sort_by_key(|m| m.priority);
        mappings
    }

    #[test]
    fn no_mappings_resolves_nothing() {
        let entities = EntryEntities {
            project_id: Some(100),
            ..Default::default()
        };
        assert_eq!(resolve_rule(&[], &entities), None);
    }

    #[test]
    fn tag_wins_over_project() {
        let mappings = sorted(vec![
            mapping(MappingEntityType::Project, 100, "2", 2),
            mapping(MappingEntityType::Tag, 50, "11", 1),
        ]);
        let tag_ids = [50];
        let entities = EntryEntities {
            tag_ids: &tag_ids,
            project_id: Some(100),
            ..Default::default()
        };
        let rule = resolve_rule(&mappings, &entities).unwrap();
        assert_eq!(rule.color_id.as_deref(), Some("11"));
    }

    #[test]
    fn project_mapping_matches() {
        let mappings = sorted(vec![mapping(MappingEntityType::Project, 100, "9", 1)]);
        let entities = EntryEntities {
            project_id: Some(100),
            ..Default::default()
        };
        let rule = resolve_rule(&mappings, &entities).unwrap();
        assert_eq!(rule.color_id.as_deref(), Some("9"));
    }

    #[test]
    fn workspace_fallback() {
        let mappings = sorted(vec![mapping(MappingEntityType::Workspace, 10, "7", 1)]);
        let entities = EntryEntities {
            project_id: Some(100),
            workspace_id: Some(10),
            ..Default::default()
        };
        let rule = resolve_rule(&mappings, &entities).unwrap();
        assert_eq!(rule.color_id.as_deref(), Some("7"));
    }

    #[test]
    fn organization_fallback() {
        let mappings = sorted(vec![mapping(MappingEntityType::Organization, 1, "10", 1)]);
        let entities = EntryEntities {
            project_id: Some(100),
            workspace_id: Some(10),
            organization_id: Some(1),
            ..Default::default()
        };
        let rule = resolve_rule(&mappings, &entities).unwrap();
        assert_eq!(rule.color_id.as_deref(), Some("10"));
    }

    #[test]
    fn best_ranked_tag_mapping_wins() {
        let mappings = sorted(vec![
            mapping(MappingEntityType::Tag, 50, "2", 10),
            mapping(MappingEntityType::Tag, 51, "11", 1),
        ]);
        let tag_ids = [50, 51];
        let entities = EntryEntities {
            tag_ids: &tag_ids,
            ..Default::default()
        };
        let rule = resolve_rule(&mappings, &entities).unwrap();
        assert_eq!(rule.color_id.as_deref(), Some("11"));
    }

    #[test]
    fn empty_entry_resolves_nothing() {
        let mappings = sorted(vec![
            mapping(MappingEntityType::Tag, 50, "2", 1),
            mapping(MappingEntityType::Project, 100, "3", 2),
        ]);
        let entities = EntryEntities::default();
        assert_eq!(resolve_rule(&mappings, &entities), None);
    }

    #[test]
    fn mapping_calendar_is_carried() {
        let calendar_id = Uuid::new_v4();
        let mut m = mapping(MappingEntityType::Project, 100, "5", 1);
        m.calendar_id = Some(calendar_id);
        let entities = EntryEntities {
            project_id: Some(100),
            ..Default::default()
        };
        let rule = resolve_rule(&[m], &entities).unwrap();
        assert_eq!(rule.calendar_id, Some(calendar_id));
    }
}
