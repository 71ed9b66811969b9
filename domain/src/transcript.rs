//! Transcript payload carried by sync queue records.

use chrono::{DateTime, Utc};
use record_sync::{Record, RecordId};
use serde::{Deserialize, Serialize};

use crate::error::{Error, InternalErrorKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Speaker {
    pub id: String,
    pub name: String,
}

/// One utterance, times in seconds from the start of the recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub speaker_id: String,
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Date,
    Location,
    Task,
    Alarm,
}

/// A date, place, task or alarm extracted from the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartEntity {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub text: String,
    /// ISO date string or normalized address.
    #[serde(default)]
    pub value: Option<String>,
    /// The sentence it came from.
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub duration_seconds: u32,
    #[serde(default)]
    pub speakers: Vec<Speaker>,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub summary_points: Vec<String>,
    #[serde(default)]
    pub action_items: Vec<ActionItem>,
    #[serde(default)]
    pub smart_entities: Vec<SmartEntity>,
}

impl Transcript {
    /// Segment texts joined with newlines, prefixed by speaker name when known.
    pub fn plain_text(&self) -> String {
        self.segments
            .iter()
            .map(|segment| {
                match self.speakers.iter().find(|s| s.id == segment.speaker_id) {
                    Some(speaker) => format!("{}: {}", speaker.name, segment.text),
                    None => segment.text.clone(),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Wraps the transcript into a new pending record for the sync queue.
    pub fn into_record(self) -> Result<Record, Error> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(Error::internal(
                InternalErrorKind::Validation,
                "transcript title must not be empty",
            ));
        }
        let created_at = self.created_at;
        let payload = serde_json::to_value(&self)?;
        Ok(Record::with_id(RecordId::new_v4(), title, created_at, payload))
    }

    /// Reads the transcript back out of a record payload.
    pub fn from_record(record: &Record) -> Result<Self, Error> {
        Ok(serde_json::from_value(record.payload().clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomainErrorKind;
    use record_sync::SyncStatus;
    use serde_json::json;

    fn transcript(title: &str) -> Transcript {
        Transcript {
            title: title.to_string(),
            created_at: Utc::now(),
            duration_seconds: 95,
            speakers: vec![Speaker {
                id: "s1".to_string(),
                name: "Ada".to_string(),
            }],
            segments: vec![
                Segment {
                    id: "seg1".to_string(),
                    speaker_id: "s1".to_string(),
                    start_time: 0.0,
                    end_time: 4.2,
                    text: "Book the venue for Friday.".to_string(),
                    confidence: Some(0.93),
                },
                Segment {
                    id: "seg2".to_string(),
                    speaker_id: "s2".to_string(),
                    start_time: 4.2,
                    end_time: 7.0,
                    text: "Sure.".to_string(),
                    confidence: None,
                },
            ],
            summary: None,
            summary_points: vec![],
            action_items: vec![ActionItem {
                id: "a1".to_string(),
                text: "Book the venue".to_string(),
                assignee: None,
                completed: false,
            }],
            smart_entities: vec![SmartEntity {
                id: "e1".to_string(),
                kind: EntityKind::Date,
                text: "Friday".to_string(),
                value: Some("2025-03-14".to_string()),
                context: "Book the venue for Friday.".to_string(),
            }],
        }
    }

    #[test]
    fn test_into_record_produces_pending_record_with_payload() {
        let original = transcript("Planning call");
        let record = original.clone().into_record().unwrap();

        assert_eq!(record.title(), "Planning call");
        assert_eq!(record.created_at(), original.created_at);
        assert_eq!(record.sync_status(), SyncStatus::Pending);
        assert_eq!(record.payload()["smart_entities"][0]["type"], "date");
        assert_eq!(Transcript::from_record(&record).unwrap(), original);
    }

    #[test]
    fn test_blank_title_is_rejected() {
        let err = transcript("  ").into_record().unwrap_err();
        assert_eq!(
            err.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::Validation)
        );
    }

    #[test]
    fn test_plain_text_labels_known_speakers() {
        assert_eq!(
            transcript("Planning call").plain_text(),
            "Ada: Book the venue for Friday.\nSure."
        );
    }

    #[test]
    fn test_minimal_payload_deserializes() {
        let parsed: Transcript = serde_json::from_value(json!({
            "title": "Voice memo",
            "created_at": "2025-03-10T08:00:00Z",
            "duration_seconds": 12
        }))
        .unwrap();
        assert!(parsed.segments.is_empty());
        assert!(parsed.summary.is_none());
    }
}
