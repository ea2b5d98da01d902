//! Drains a queue of pending email and relays each message over SMTP.
//!
//! A batch runs through [`execute`]: every queued [`MessageQueueEntity`] is
//! validated, checked against the test-account filter and handed to a
//! [`Transport`], with the outcome recorded back on the entity.

pub mod builder;
pub mod config;
pub mod driver;
pub mod entity;
pub mod error;
pub mod filter;
pub mod result;
pub mod service;
pub mod transport;

pub use builder::{MailMessage, MessageAttachment, build_message};
pub use config::{Configuration, DefaultFrom, ServerSettings, TestAccounts};
pub use courier_smtp::client::{BodyFormat, Priority};
pub use driver::send_queued_emails;
pub use entity::{AttachmentEntity, MessageQueueEntity};
pub use error::{BuildError, ConfigError, DispatchError, SendError, TransportError, TransportErrorKind};
pub use filter::is_test_email_detected;
pub use result::NotificationResult;
pub use service::{execute, execute_with};
pub use transport::{SendCompleted, SendCompletedHook, SmtpTransport, Transport};
