use serde::Serialize;

use crate::entity::MessageQueueEntity;

/// The processed queue of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationResult {
    pub emails: Vec<MessageQueueEntity>,
    /// `false` if the batch was disabled or abandoned part way through.
    pub is_success: bool,
}

impl NotificationResult {
    #[must_use]
    pub const fn new(emails: Vec<MessageQueueEntity>, is_success: bool) -> Self {
        Self { emails, is_success }
    }

    /// Messages sent, including suppressed test emails.
    #[must_use]
    pub fn email_sent(&self) -> usize {
        self.emails.iter().filter(|email| email.is_sent).count()
    }

    #[must_use]
    pub fn test_emails(&self) -> usize {
        self.emails.iter().filter(|email| email.is_test_email).count()
    }

    /// Messages whose last attempt failed.
    pub fn failed(&self) -> impl Iterator<Item = &MessageQueueEntity> {
        self.emails.iter().filter(|email| email.is_failed())
    }
}
