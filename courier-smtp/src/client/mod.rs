//! SMTP client for relaying queued notifications.
//!
//! - Plain TCP connections with an optional STARTTLS upgrade
//! - AUTH PLAIN and AUTH LOGIN
//! - Dot-stuffed DATA transmission
//! - MIME rendering via [`MessageBuilder`]
//!
//! # Examples
//!
//! ```no_run
//! use courier_smtp::client::{MessageBuilder, SmtpClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = SmtpClient::connect("localhost:25", "localhost".to_string()).await?;
//! client.read_greeting().await?;
//! client.ehlo("client.example.com").await?;
//! client.mail_from("sender@example.com").await?;
//! client.rcpt_to("recipient@example.com").await?;
//! client.data().await?;
//!
//! let message = MessageBuilder::new()
//!     .from("sender@example.com")
//!     .to("recipient@example.com")
//!     .subject("Hello")
//!     .body("Hello World")
//!     .build()?;
//! client.send_data(&message).await?;
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod message;
mod response;
mod smtp_client;

pub use error::{ClientError, Result};
pub use message::{Attachment, BodyFormat, MessageBuilder, Priority, encode_word, guess_content_type};
pub use response::{Response, ResponseLine};
pub use smtp_client::{AuthMechanism, SmtpClient};
