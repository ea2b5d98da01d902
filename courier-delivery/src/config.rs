//! Batch configuration.
//!
//! A [`Configuration`] can be assembled in code with its setters or loaded
//! from a RON document:
//!
//! ```ron
//! (
//!     enabled: true,
//!     server: (
//!         host: "smtp.example.com",
//!         port: 587,
//!         ssl: true,
//!         require_login: true,
//!         username: "notifications",
//!         password: "hunter2",
//!         connection_limit: 4,
//!     ),
//!     default_from: Some((address: "noreply@example.com", display_name: Some("Example"))),
//!     test_accounts: (enabled: true, accounts: ["@example.com"]),
//! )
//! ```

use std::{fmt, path::Path, sync::Arc, time::Duration};

use courier_common::log_sink::LogSink;
use serde::{Deserialize, Serialize};

use crate::{entity::MessageQueueEntity, error::ConfigError, transport::SendCompletedHook};

const fn default_port() -> u16 {
    25
}

const fn default_connection_limit() -> u32 {
    4
}

fn default_helo_name() -> String {
    "localhost".to_string()
}

/// Connection parameters for the SMTP relay.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Require STARTTLS before anything else is sent.
    #[serde(default)]
    pub ssl: bool,

    #[serde(default)]
    pub require_login: bool,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Pause the batch after this many send attempts. Zero disables the pause.
    #[serde(default = "default_connection_limit")]
    pub connection_limit: u32,

    /// Upper bound on a single send, in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Name announced in EHLO.
    #[serde(default = "default_helo_name")]
    pub helo_name: String,

    /// Accept any certificate after STARTTLS. Only meant for relays with
    /// self-signed certificates.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl ServerSettings {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    #[must_use]
    pub fn with_login(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.require_login = true;
        self.username = username.into();
        self.password = password.into();
        self
    }

    #[must_use]
    pub const fn with_connection_limit(mut self, limit: u32) -> Self {
        self.connection_limit = limit;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// `host:port`
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            ssl: false,
            require_login: false,
            username: String::new(),
            password: String::new(),
            connection_limit: default_connection_limit(),
            timeout_secs: None,
            helo_name: default_helo_name(),
            accept_invalid_certs: false,
        }
    }
}

impl fmt::Debug for ServerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("ssl", &self.ssl)
            .field("require_login", &self.require_login)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("connection_limit", &self.connection_limit)
            .field("timeout_secs", &self.timeout_secs)
            .field("helo_name", &self.helo_name)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

/// Sender used when a queued message has no `from`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultFrom {
    pub address: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Test-account suppression settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestAccounts {
    pub enabled: bool,
    /// Case-insensitive substrings matched against a message's `to`.
    pub accounts: Vec<String>,
}

/// Everything a batch needs: settings, the queue and the collaborators.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub enabled: bool,
    pub server: ServerSettings,
    pub default_from: Option<DefaultFrom>,
    pub test_accounts: TestAccounts,
    pub emails: Vec<MessageQueueEntity>,
    #[serde(skip)]
    pub log: Option<Arc<dyn LogSink>>,
    #[serde(skip)]
    pub send_completed: Option<SendCompletedHook>,
}

impl Configuration {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a RON document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` if the document is not a valid configuration.
    pub fn from_ron_str(content: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(content)?)
    }

    /// Reads and parses the RON document at `path`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file can't be read, or
    /// `ConfigError::Parse` if it is not a valid configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_ron_str(&content)
    }

    #[must_use]
    pub fn with_server_settings(mut self, server: ServerSettings) -> Self {
        self.server = server;
        self
    }

    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_default_from(mut self, address: impl Into<String>, display_name: Option<&str>) -> Self {
        self.default_from = Some(DefaultFrom {
            address: address.into(),
            display_name: display_name.map(ToString::to_string),
        });
        self
    }

    #[must_use]
    pub fn with_emails(mut self, emails: Vec<MessageQueueEntity>) -> Self {
        self.emails = emails;
        self
    }

    /// Turns test-account suppression on or off, matching `to` against
    /// `accounts`.
    #[must_use]
    pub fn ignore_test_accounts<I, S>(mut self, enabled: bool, accounts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.test_accounts = TestAccounts {
            enabled,
            accounts: accounts.into_iter().map(Into::into).collect(),
        };
        self
    }

    #[must_use]
    pub fn with_log_sink(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = Some(log);
        self
    }

    #[must_use]
    pub fn with_send_completed(mut self, hook: SendCompletedHook) -> Self {
        self.send_completed = Some(hook);
        self
    }

    /// The configured log sink, if any.
    #[must_use]
    pub fn log_sink(&self) -> Option<&dyn LogSink> {
        self.log.as_deref()
    }

    /// The default sender address, if one is configured and not blank.
    #[must_use]
    pub fn default_from_address(&self) -> Option<&DefaultFrom> {
        self.default_from
            .as_ref()
            .filter(|from| !from.address.trim().is_empty())
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("enabled", &self.enabled)
            .field("server", &self.server)
            .field("default_from", &self.default_from)
            .field("test_accounts", &self.test_accounts)
            .field("emails", &self.emails.len())
            .field("log", &self.log.is_some())
            .field("send_completed", &self.send_completed.is_some())
            .finish()
    }
}
