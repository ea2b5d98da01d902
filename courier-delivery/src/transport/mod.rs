//! The send capability used by the batch loop.

mod smtp;

use std::sync::Arc;

use async_trait::async_trait;

pub use self::smtp::SmtpTransport;
use crate::{builder::MailMessage, error::TransportError};

/// Hands one message to a relay.
#[async_trait]
pub trait Transport: Send {
    /// Sends `message`, returning once the relay has accepted or refused it.
    async fn send(&mut self, message: &MailMessage) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn send(&mut self, message: &MailMessage) -> Result<(), TransportError> {
        (**self).send(message).await
    }
}

/// Reported to the send-completed hook after every send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendCompleted {
    /// Envelope recipients of the message.
    pub recipients: Vec<String>,
    pub subject: String,
    pub error: Option<TransportError>,
}

impl SendCompleted {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

pub type SendCompletedHook = Arc<dyn Fn(&SendCompleted) + Send + Sync>;
