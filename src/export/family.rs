//! Descriptors for the exported resource families.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::document::{parse_formatted_date, Document, DocumentError};

/// Where an entity's semantic date comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSource {
    /// Epoch milliseconds stored in the named field.
    EpochMillis(&'static str),
    /// The newest formatted `updated_at` among the entity's comments, or the
    /// entity's own `updated_at` when no comment carries a readable one.
    LatestActivity,
}

impl DateSource {
    pub fn resolve(&self, document: &Document) -> Result<DateTime<Utc>, DocumentError> {
        match self {
            DateSource::EpochMillis(key) => document.epoch_millis(key),
            DateSource::LatestActivity => {
                let mut latest = None;
                let comments = document.get("comments").and_then(Value::as_array);
                for comment in comments.into_iter().flatten() {
                    let Some(raw) = comment.get("updated_at").and_then(Value::as_str) else {
                        continue;
                    };
                    match parse_formatted_date(raw) {
                        Ok(date) => latest = latest.max(Some(date)),
                        Err(e) => {
                            tracing::warn!(value = %raw, "Ignoring unparseable comment date: {}", e)
                        }
                    }
                }
                match latest {
                    Some(date) => Ok(date),
                    None => document.formatted_date("updated_at"),
                }
            }
        }
    }
}

/// Whose characters a [`Family::Characters`] export covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CharacterScope {
    /// The configured user's own characters, active and archived.
    User,
    /// Characters attached to one campaign.
    Campaign(String),
}

/// One traversal shape: how to list items, which key holds them and where
/// they land on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Family {
    Messages,
    Characters {
        scope: CharacterScope,
        directory: String,
    },
    Roleplays {
        campaign_id: String,
        directory: String,
    },
    Discussions {
        campaign_id: String,
        directory: String,
    },
}

impl Family {
    pub fn user_characters() -> Self {
        Family::Characters {
            scope: CharacterScope::User,
            directory: "characters".to_string(),
        }
    }

    pub fn campaign_characters(campaign_id: &str, campaign_dir: &str) -> Self {
        Family::Characters {
            scope: CharacterScope::Campaign(campaign_id.to_string()),
            directory: format!("{}/characters", campaign_dir),
        }
    }

    pub fn roleplays(campaign_id: &str, campaign_dir: &str) -> Self {
        Family::Roleplays {
            campaign_id: campaign_id.to_string(),
            directory: format!("{}/roleplays", campaign_dir),
        }
    }

    pub fn discussions(campaign_id: &str, campaign_dir: &str) -> Self {
        Family::Discussions {
            campaign_id: campaign_id.to_string(),
            directory: format!("{}/discussions", campaign_dir),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Family::Messages => "message",
            Family::Characters { .. } => "character",
            Family::Roleplays { .. } => "roleplay",
            Family::Discussions { .. } => "discussion",
        }
    }

    /// Key of the listing document that holds the item summaries.
    pub fn list_key(&self) -> &'static str {
        match self {
            Family::Messages => "messages",
            Family::Characters { .. } => "characters",
            Family::Roleplays { .. } => "roleplays",
            Family::Discussions { .. } => "discussions",
        }
    }

    /// Directory relative to the export root.
    pub fn directory(&self) -> &str {
        match self {
            Family::Messages => "messages",
            Family::Characters { directory, .. }
            | Family::Roleplays { directory, .. }
            | Family::Discussions { directory, .. } => directory.as_str(),
        }
    }

    pub fn date_source(&self) -> DateSource {
        match self {
            Family::Messages => DateSource::LatestActivity,
            _ => DateSource::EpochMillis("created_at"),
        }
    }

    /// Characters carry a portrait that is saved next to the JSON.
    pub fn has_portrait(&self) -> bool {
        matches!(self, Family::Characters { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    fn utc(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_latest_activity_prefers_newest_comment() {
        let message = doc(json!({
            "updated_at": "2023-01-01 09:00 AM",
            "comments": [
                {"updated_at": "2023-03-02 10:15 PM"},
                {"updated_at": "2023-02-01 08:00 AM"},
            ],
        }));
        assert_eq!(
            DateSource::LatestActivity.resolve(&message).unwrap(),
            utc("2023-03-02T22:15:00Z")
        );
    }

    #[test]
    fn test_latest_activity_ignores_unreadable_comment_dates() {
        let message = doc(json!({
            "updated_at": "2023-01-01 09:00 AM",
            "comments": [
                {"updated_at": "2023-06-15 02:30 PM"},
                {"updated_at": "2023-06-15T14:31:00Z"},
            ],
        }));
        assert_eq!(
            DateSource::LatestActivity.resolve(&message).unwrap(),
            utc("2023-06-15T14:30:00Z")
        );
    }

    #[test]
    fn test_latest_activity_falls_back_when_no_comment_date_parses() {
        let message = doc(json!({
            "updated_at": "2023-01-01 09:00 AM",
            "comments": [{"updated_at": "yesterday"}, {"body": "no date"}],
        }));
        assert_eq!(
            DateSource::LatestActivity.resolve(&message).unwrap(),
            utc("2023-01-01T09:00:00Z")
        );
    }

    #[test]
    fn test_latest_activity_falls_back_to_own_date() {
        let message = doc(json!({"updated_at": "2023-01-01 09:00 AM", "comments": []}));
        assert_eq!(
            DateSource::LatestActivity.resolve(&message).unwrap(),
            utc("2023-01-01T09:00:00Z")
        );
    }

    #[test]
    fn test_epoch_millis_source() {
        let roleplay = doc(json!({"created_at": 1686839400000_i64}));
        assert_eq!(
            DateSource::EpochMillis("created_at").resolve(&roleplay).unwrap(),
            utc("2023-06-15T14:30:00Z")
        );
    }

    #[test]
    fn test_campaign_directories() {
        assert_eq!(
            Family::roleplays("7", "campaigns/Tale").directory(),
            "campaigns/Tale/roleplays"
        );
        assert_eq!(
            Family::discussions("7", "campaigns/Tale").directory(),
            "campaigns/Tale/discussions"
        );
        assert_eq!(
            Family::campaign_characters("7", "campaigns/Tale").directory(),
            "campaigns/Tale/characters"
        );
        assert_eq!(Family::user_characters().directory(), "characters");
        assert_eq!(Family::Messages.directory(), "messages");
    }
}
