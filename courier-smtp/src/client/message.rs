//! Email message builder with support for headers, body, and MIME attachments.

use std::{borrow::Cow, fmt::Write, path::Path};

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{ClientError, Result};

/// Line length used when wrapping base64 content.
const BASE64_LINE_LENGTH: usize = 76;

/// How the message body should be presented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyFormat {
    #[default]
    Html,
    PlainText,
}

impl BodyFormat {
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Html => "text/html",
            Self::PlainText => "text/plain",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    #[default]
    Normal,
    Low,
    High,
}

impl Priority {
    /// Values for the `X-Priority` and `Importance` headers, or `None` for
    /// normal priority, which is expressed by omitting them.
    const fn headers(self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::Normal => None,
            Self::Low => Some(("5", "low")),
            Self::High => Some(("1", "high")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Renders an RFC 5322 message, multipart when attachments are present.
///
/// Recipients added here only appear in the headers; the SMTP envelope is
/// managed separately, which is how blind copies stay hidden.
///
/// ```
/// use courier_smtp::client::{BodyFormat, MessageBuilder, Priority};
///
/// let message = MessageBuilder::new()
///     .from("sender@example.com")
///     .to("recipient@example.com")
///     .subject("Hello")
///     .format(BodyFormat::PlainText)
///     .priority(Priority::High)
///     .body("This is the message body")
///     .build()
///     .unwrap();
///
/// assert!(message.contains("X-Priority: 1\r\n"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: Option<String>,
    to: Vec<String>,
    cc: Vec<String>,
    subject: Option<String>,
    headers: Vec<(String, String)>,
    body: Option<String>,
    format: BodyFormat,
    priority: Priority,
    date: Option<DateTime<Utc>>,
    boundary: Option<String>,
    attachments: Vec<Attachment>,
}

impl MessageBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.from = Some(address.into());
        self
    }

    #[must_use]
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to.push(address.into());
        self
    }

    #[must_use]
    pub fn cc(mut self, address: impl Into<String>) -> Self {
        self.cc.push(address.into());
        self
    }

    /// Sets the subject, encoding it per RFC 2047 when it isn't plain ASCII.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn body(mut self, content: impl Into<String>) -> Self {
        self.body = Some(content.into());
        self
    }

    #[must_use]
    pub const fn format(mut self, format: BodyFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub const fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// The `Date` header; defaults to the time of [`Self::build`].
    #[must_use]
    pub const fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Overrides the generated multipart boundary.
    #[must_use]
    pub fn boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = Some(boundary.into());
        self
    }

    #[must_use]
    pub fn attach(
        mut self,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        self.attachments.push(Attachment {
            filename: filename.into(),
            content_type: content_type.into(),
            data,
        });
        self
    }

    /// Attaches a file from disk. Without an explicit `content_type` one is
    /// guessed from the extension.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Attachment` if the file cannot be read.
    pub async fn attach_file(
        mut self,
        path: impl AsRef<Path>,
        content_type: Option<&str>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                ClientError::BuilderError(format!("Invalid attachment path: {}", path.display()))
            })?
            .to_string();

        let data = tokio::fs::read(path)
            .await
            .map_err(|source| ClientError::Attachment {
                path: path.to_path_buf(),
                source,
            })?;

        let content_type =
            content_type.map_or_else(|| guess_content_type(path).to_string(), ToString::to_string);

        self.attachments.push(Attachment {
            filename,
            content_type,
            data,
        });

        Ok(self)
    }

    /// Renders the message with CRLF line endings.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::BuilderError` if no `From` address was set.
    pub fn build(&self) -> Result<String> {
        let from = self
            .from
            .as_deref()
            .ok_or_else(|| ClientError::BuilderError("missing From address".to_string()))?;

        let mut message = String::with_capacity(1024);
        push_header(&mut message, "From", from);
        if !self.to.is_empty() {
            push_header(&mut message, "To", &self.to.join(", "));
        }
        if !self.cc.is_empty() {
            push_header(&mut message, "Cc", &self.cc.join(", "));
        }
        if let Some(subject) = &self.subject {
            push_header(&mut message, "Subject", &encode_word(subject));
        }
        push_header(
            &mut message,
            "Date",
            &self.date.unwrap_or_else(Utc::now).to_rfc2822(),
        );
        if let Some((x_priority, importance)) = self.priority.headers() {
            push_header(&mut message, "X-Priority", x_priority);
            push_header(&mut message, "Importance", importance);
        }
        for (name, value) in &self.headers {
            push_header(&mut message, name, value);
        }
        push_header(&mut message, "MIME-Version", "1.0");

        if self.attachments.is_empty() {
            self.push_body(&mut message);
            return Ok(message);
        }

        let boundary = self.boundary.clone().unwrap_or_else(generate_boundary);
        push_header(
            &mut message,
            "Content-Type",
            &format!("multipart/mixed; boundary=\"{boundary}\""),
        );
        message.push_str("\r\n");

        let _ = write!(message, "--{boundary}\r\n");
        self.push_body(&mut message);
        message.push_str("\r\n");

        for attachment in &self.attachments {
            let _ = write!(message, "--{boundary}\r\n");
            let filename = encode_word(&attachment.filename);
            push_header(
                &mut message,
                "Content-Type",
                &format!("{}; name=\"{filename}\"", attachment.content_type),
            );
            push_header(&mut message, "Content-Transfer-Encoding", "base64");
            push_header(
                &mut message,
                "Content-Disposition",
                &format!("attachment; filename=\"{filename}\""),
            );
            message.push_str("\r\n");
            message.push_str(&wrap_base64(&attachment.data));
        }

        let _ = write!(message, "--{boundary}--\r\n");
        Ok(message)
    }

    /// Writes the body's headers, a blank line, then the body itself.
    fn push_body(&self, message: &mut String) {
        let body = normalize_line_endings(self.body.as_deref().unwrap_or_default());

        push_header(
            message,
            "Content-Type",
            &format!("{}; charset=utf-8", self.format.mime_type()),
        );

        if body.is_ascii() {
            push_header(message, "Content-Transfer-Encoding", "7bit");
            message.push_str("\r\n");
            message.push_str(&body);
        } else {
            push_header(message, "Content-Transfer-Encoding", "base64");
            message.push_str("\r\n");
            message.push_str(&wrap_base64(body.as_bytes()));
        }
    }
}

fn push_header(message: &mut String, name: &str, value: &str) {
    let _ = write!(message, "{name}: {value}\r\n");
}

/// Encodes `text` as an RFC 2047 encoded-word if it contains anything other
/// than printable ASCII; otherwise returns it unchanged.
#[must_use]
pub fn encode_word(text: &str) -> Cow<'_, str> {
    if text.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(format!("=?utf-8?B?{}?=", STANDARD.encode(text)))
    }
}

fn normalize_line_endings(text: &str) -> Cow<'_, str> {
    let bytes = text.as_bytes();
    let has_bare_lf = bytes
        .iter()
        .enumerate()
        .any(|(i, &b)| b == b'\n' && (i == 0 || bytes[i - 1] != b'\r'));
    if !has_bare_lf {
        return Cow::Borrowed(text);
    }

    Cow::Owned(text.replace("\r\n", "\n").replace('\n', "\r\n"))
}

fn wrap_base64(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut wrapped = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE_LENGTH * 2 + 2);

    for line in encoded.as_bytes().chunks(BASE64_LINE_LENGTH) {
        // base64 output is ASCII, so every chunk is valid UTF-8.
        wrapped.push_str(std::str::from_utf8(line).unwrap_or_default());
        wrapped.push_str("\r\n");
    }

    wrapped
}

fn generate_boundary() -> String {
    let now = Utc::now();
    format!(
        "----=_Part_{}_{}",
        now.timestamp(),
        now.timestamp_subsec_nanos()
    )
}

/// Guesses a MIME content type from a file extension.
#[must_use]
pub fn guess_content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    match extension.as_str() {
        "txt" | "log" => "text/plain",
        "html" | "htm" => "text/html",
        "csv" => "text/csv",
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "zip" => "application/zip",
        "json" => "application/json",
        "xml" => "application/xml",
        _ => "application/octet-stream",
    }
}
