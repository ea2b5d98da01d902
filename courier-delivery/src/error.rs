//! Typed errors for a notification batch.
//!
//! Per-message failures ([`BuildError`], [`TransportError`]) are recorded on
//! the entity as a [`SendError`] and never abort the batch. A
//! [`DispatchError`] aborts the batch and marks the result unsuccessful.

use std::{io, path::PathBuf};

use courier_smtp::client::ClientError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A queued message could not be turned into a sendable one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
pub enum BuildError {
    #[error(
        "Email Notification: 'from' property is empty. Make sure you configure the default from email address, or pass it in."
    )]
    FromAddressNotConfigured,

    #[error("Email Notification: 'to' property is empty.")]
    ToAddressNotSet,

    #[error("Email Notification: 'From' property has invalid email address.")]
    FromAddressInvalid,

    #[error("Email Notification: 'to' property has invalid email address.")]
    ToAddressInvalid,

    #[error("Email Notification: 'CC' property has invalid email address.")]
    CcAddressInvalid,

    #[error("Email Notification: 'BCC' property has invalid email address.")]
    BccAddressInvalid,
}

/// How a failed send is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportErrorKind {
    /// The relay refused one or more recipients.
    RecipientsRejected,
    /// The message had no sender.
    ArgumentInvalid,
    /// An argument was outside what the transport accepts.
    ArgumentOutOfRange,
    /// The connection or the SMTP exchange failed.
    Protocol,
    /// The message or transport is in a state that can't be sent, such as
    /// a message without recipients.
    InvalidOperation,
    Unclassified,
}

/// A failed send, as reported by a [`crate::Transport`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    /// Recipients the relay refused, for [`TransportErrorKind::RecipientsRejected`].
    #[serde(default)]
    pub failed_recipients: Vec<String>,
}

impl TransportError {
    #[must_use]
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            failed_recipients: Vec::new(),
        }
    }

    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Protocol, message)
    }

    #[must_use]
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::InvalidOperation, message)
    }

    #[must_use]
    pub fn recipients_rejected(failed_recipients: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::RecipientsRejected,
            message: message.into(),
            failed_recipients,
        }
    }
}

impl From<ClientError> for TransportError {
    fn from(error: ClientError) -> Self {
        let kind = match &error {
            ClientError::Io(_)
            | ClientError::ParseError(_)
            | ClientError::UnexpectedResponse { .. }
            | ClientError::SmtpError { .. }
            | ClientError::TlsError(_)
            | ClientError::ConnectionClosed => TransportErrorKind::Protocol,
            ClientError::BuilderError(_) => TransportErrorKind::InvalidOperation,
            ClientError::Attachment { .. } | ClientError::Utf8Error(_) => {
                TransportErrorKind::Unclassified
            }
        };

        Self::new(kind, error.to_string())
    }
}

/// The failure recorded on a message entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
pub enum SendError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Aborts a whole batch.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Unable to set up the SMTP transport: {0}")]
    TransportSetup(String),

    #[error(
        "The message content type needs to be set when sending in an attachment stream (message '{message_id}')."
    )]
    MissingAttachmentContentType { message_id: String },

    #[error("Unable to read attachment {} for message '{message_id}': {source}", path.display())]
    AttachmentUnreadable {
        message_id: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read configuration file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] ron::error::SpannedError),
}
