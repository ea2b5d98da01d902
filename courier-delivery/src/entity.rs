//! The queued message record and its outcome fields.

use std::{path::PathBuf, sync::Arc};

use chrono::{DateTime, Utc};
use courier_smtp::client::{BodyFormat, Priority};
use serde::{Deserialize, Serialize};

use crate::error::SendError;

/// One queued email.
///
/// `from`, `to`, `cc` and `bcc` hold address lists separated by `;` or `,`.
/// An empty (or whitespace) `from` falls back to the configured default
/// sender. The remaining fields below `bcc` record the outcome of the last
/// batch that processed this message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageQueueEntity {
    /// Opaque identifier owned by the caller.
    pub id: String,
    pub priority: Priority,
    pub created: DateTime<Utc>,
    /// When the message was sent or suppressed as a test email.
    pub sent: Option<DateTime<Utc>>,
    pub body_format: BodyFormat,
    pub subject: String,
    pub body: String,
    pub from: String,
    pub to: String,
    pub cc: String,
    pub bcc: String,
    pub is_sent: bool,
    pub is_test_email: bool,
    /// The reason the last attempt failed.
    pub sent_exception: Option<SendError>,
    pub attachments: Vec<AttachmentEntity>,
}

impl MessageQueueEntity {
    /// A queued message from `to`, created at `created`.
    #[must_use]
    pub fn new(id: impl Into<String>, to: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            to: to.into(),
            created,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.sent_exception.is_some()
    }
}

/// An attachment on a queued message: either a file on disk or in-memory
/// content. Content attachments must carry a content type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentEntity {
    pub file_name: Option<PathBuf>,
    pub content_type: Option<String>,
    pub content: Option<Arc<[u8]>>,
}

impl AttachmentEntity {
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            file_name: Some(path.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn content(content: impl Into<Arc<[u8]>>, content_type: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            content_type: Some(content_type.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::BuildError;

    #[test]
    fn test_deserialize_sparse_entity() {
        let entity: MessageQueueEntity = ron::from_str(
            r#"(
                id: "42",
                to: "someone@example.com",
                subject: "Hello",
                body_format: PlainText,
                priority: High,
                created: "2024-03-01T10:00:00Z",
                attachments: [(file_name: Some("report.pdf"))],
            )"#,
        )
        .unwrap();

        assert_eq!(entity.id, "42");
        assert_eq!(entity.body_format, BodyFormat::PlainText);
        assert_eq!(entity.priority, Priority::High);
        assert_eq!(
            entity.created,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(entity.attachments, vec![AttachmentEntity::file("report.pdf")]);
        assert!(!entity.is_sent);
        assert!(entity.sent_exception.is_none());
    }

    #[test]
    fn test_outcome_survives_round_trip() {
        let mut entity = MessageQueueEntity::new("1", "bad-email", Utc::now());
        entity.sent_exception = Some(BuildError::ToAddressInvalid.into());

        let text = ron::to_string(&entity).unwrap();
        let restored: MessageQueueEntity = ron::from_str(&text).unwrap();

        assert!(restored.is_failed());
        assert_eq!(restored, entity);
    }
}
