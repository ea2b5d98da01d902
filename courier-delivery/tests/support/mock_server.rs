//! Scriptable SMTP relay for driving `SmtpTransport` end to end.
//!
//! ```rust,no_run
//! use support::mock_server::MockSmtpServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MockSmtpServer::builder()
//!     .with_auth()
//!     .reject_recipient("nobody@example.com", 550, "User unknown")
//!     .build()
//!     .await?;
//!
//! // Point `ServerSettings` at server.addr() and send.
//! server.shutdown();
//! # Ok(())
//! # }
//! ```
#![allow(dead_code)]

use std::{
    fmt::Write,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use courier_common::tracing;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream, tcp::ReadHalf},
    sync::RwLock,
    time::timeout,
};

/// A command as the relay received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    Helo(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    /// Everything between DATA and the terminating dot, still dot-stuffed.
    MessageContent(String),
    /// The arguments of an AUTH command.
    Auth(String),
    /// A line sent in answer to a 334 challenge.
    AuthResponse(String),
    StartTls,
    Quit,
    Other(String),
}

#[derive(Debug, Clone)]
struct Reply {
    code: u16,
    message: String,
}

impl Reply {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Clone)]
struct Script {
    greeting: Reply,
    /// `None` answers EHLO with 502 so clients fall back to HELO.
    capabilities: Option<Vec<String>>,
    helo: Reply,
    mail_from: Reply,
    rcpt_to: Reply,
    rejected_recipients: Vec<(String, Reply)>,
    data: Reply,
    data_end: Reply,
    auth: Reply,
    starttls: Option<Reply>,
    response_delay: Option<Duration>,
}

impl Script {
    fn ehlo_bytes(&self) -> Vec<u8> {
        let Some(capabilities) = &self.capabilities else {
            return Reply::new(502, "Command not implemented").to_bytes();
        };

        let mut lines = vec!["mock.example.com".to_string()];
        lines.extend(capabilities.iter().cloned());

        let mut response = String::new();
        let last = lines.len() - 1;
        for (i, line) in lines.iter().enumerate() {
            let separator = if i == last { ' ' } else { '-' };
            let _ = write!(response, "250{separator}{line}\r\n");
        }

        response.into_bytes()
    }

    fn rcpt_reply(&self, argument: &str) -> &Reply {
        self.rejected_recipients
            .iter()
            .find(|(address, _)| argument.contains(address.as_str()))
            .map_or(&self.rcpt_to, |(_, reply)| reply)
    }
}

impl Default for Script {
    fn default() -> Self {
        Self {
            greeting: Reply::new(220, "mock.example.com ESMTP ready"),
            capabilities: Some(vec!["SIZE 10000".to_string(), "8BITMIME".to_string()]),
            helo: Reply::new(250, "Hello"),
            mail_from: Reply::new(250, "OK"),
            rcpt_to: Reply::new(250, "OK"),
            rejected_recipients: Vec::new(),
            data: Reply::new(354, "Start mail input; end with <CRLF>.<CRLF>"),
            data_end: Reply::new(250, "OK: queued"),
            auth: Reply::new(235, "Authentication successful"),
            starttls: None,
            response_delay: None,
        }
    }
}

pub struct MockSmtpServer {
    addr: SocketAddr,
    commands: Arc<RwLock<Vec<SmtpCommand>>>,
    shutdown: Arc<AtomicBool>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder {
            script: Script::default(),
        }
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Every command received so far, across all sessions.
    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands.read().await.clone()
    }

    /// The message bodies accepted so far.
    pub async fn messages(&self) -> Vec<String> {
        self.commands
            .read()
            .await
            .iter()
            .filter_map(|command| match command {
                SmtpCommand::MessageContent(content) => Some(content.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn handle_client(
        mut stream: TcpStream,
        script: Arc<Script>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        writer.write_all(&script.greeting.to_bytes()).await?;
        writer.flush().await?;

        loop {
            line.clear();
            let Ok(read) = timeout(Duration::from_secs(10), reader.read_line(&mut line)).await
            else {
                return Ok(());
            };
            if read? == 0 {
                return Ok(());
            }

            let command_line = line.trim_end().to_string();
            tracing::debug!("Mock server received: {command_line}");

            let (verb, argument) = command_line
                .split_once(' ')
                .unwrap_or((command_line.as_str(), ""));
            let argument = argument.to_string();

            let (response, command) = match verb.to_uppercase().as_str() {
                "EHLO" => (script.ehlo_bytes(), SmtpCommand::Ehlo(argument)),
                "HELO" => (script.helo.to_bytes(), SmtpCommand::Helo(argument)),
                "MAIL" => (script.mail_from.to_bytes(), SmtpCommand::MailFrom(argument)),
                "RCPT" => (
                    script.rcpt_reply(&argument).to_bytes(),
                    SmtpCommand::RcptTo(argument),
                ),
                "DATA" => (script.data.to_bytes(), SmtpCommand::Data),
                "AUTH" => {
                    commands.write().await.push(SmtpCommand::Auth(argument.clone()));
                    if argument.eq_ignore_ascii_case("LOGIN") {
                        for challenge in ["VXNlcm5hbWU6", "UGFzc3dvcmQ6"] {
                            writer
                                .write_all(format!("334 {challenge}\r\n").as_bytes())
                                .await?;
                            writer.flush().await?;
                            let answer = Self::read_line(&mut reader).await?;
                            commands.write().await.push(SmtpCommand::AuthResponse(answer));
                        }
                    }
                    writer.write_all(&script.auth.to_bytes()).await?;
                    writer.flush().await?;
                    continue;
                }
                "STARTTLS" => (
                    script
                        .starttls
                        .as_ref()
                        .map_or_else(
                            || Reply::new(502, "Command not implemented"),
                            Clone::clone,
                        )
                        .to_bytes(),
                    SmtpCommand::StartTls,
                ),
                "QUIT" => {
                    commands.write().await.push(SmtpCommand::Quit);
                    writer.write_all(&Reply::new(221, "Bye").to_bytes()).await?;
                    writer.flush().await?;
                    return Ok(());
                }
                _ => (
                    Reply::new(500, "Unknown command").to_bytes(),
                    SmtpCommand::Other(command_line.clone()),
                ),
            };

            let is_data = command == SmtpCommand::Data;
            commands.write().await.push(command);

            if let Some(delay) = script.response_delay {
                tokio::time::sleep(delay).await;
            }

            writer.write_all(&response).await?;
            writer.flush().await?;

            if is_data && script.data.code == 354 {
                let mut content = String::new();
                loop {
                    let data_line = Self::read_line(&mut reader).await?;
                    if data_line == "." {
                        break;
                    }
                    content.push_str(&data_line);
                    content.push_str("\r\n");
                }

                commands
                    .write()
                    .await
                    .push(SmtpCommand::MessageContent(content));
                writer.write_all(&script.data_end.to_bytes()).await?;
                writer.flush().await?;
            }
        }
    }

    async fn read_line(
        reader: &mut BufReader<ReadHalf<'_>>,
    ) -> Result<String, Box<dyn std::error::Error>> {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err("connection closed".into());
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

pub struct MockSmtpServerBuilder {
    script: Script,
}

impl MockSmtpServerBuilder {
    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.script.greeting = Reply::new(code, message);
        self
    }

    /// Replace the EHLO keywords after the greeting line.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: &[&str]) -> Self {
        self.script.capabilities = Some(capabilities.iter().map(ToString::to_string).collect());
        self
    }

    /// Answer EHLO with 502.
    #[must_use]
    pub fn without_ehlo(mut self) -> Self {
        self.script.capabilities = None;
        self
    }

    /// Advertise `AUTH PLAIN LOGIN`.
    #[must_use]
    pub fn with_auth(self) -> Self {
        self.with_capabilities(&["SIZE 10000", "AUTH PLAIN LOGIN"])
    }

    #[must_use]
    pub fn with_auth_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.script.auth = Reply::new(code, message);
        self
    }

    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.script.mail_from = Reply::new(code, message);
        self
    }

    /// The reply to every RCPT not matched by [`Self::reject_recipient`].
    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.script.rcpt_to = Reply::new(code, message);
        self
    }

    #[must_use]
    pub fn reject_recipient(
        mut self,
        address: impl Into<String>,
        code: u16,
        message: impl Into<String>,
    ) -> Self {
        self.script
            .rejected_recipients
            .push((address.into(), Reply::new(code, message)));
        self
    }

    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.script.data_end = Reply::new(code, message);
        self
    }

    #[must_use]
    pub fn with_starttls_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.script.starttls = Some(Reply::new(code, message));
        self
    }

    /// Wait this long before answering each command.
    #[must_use]
    pub const fn with_response_delay(mut self, delay: Duration) -> Self {
        self.script.response_delay = Some(delay);
        self
    }

    /// # Errors
    ///
    /// Returns an error if no local port can be bound.
    pub async fn build(self) -> Result<MockSmtpServer, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let script = Arc::new(self.script);
        let commands = Arc::new(RwLock::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let session_commands = Arc::clone(&commands);
        let stop = Arc::clone(&shutdown);
        tokio::spawn(async move {
            while !stop.load(Ordering::Relaxed) {
                let Ok(Ok((stream, _peer))) =
                    timeout(Duration::from_millis(100), listener.accept()).await
                else {
                    continue;
                };

                let script = Arc::clone(&script);
                let commands = Arc::clone(&session_commands);
                tokio::spawn(async move {
                    if let Err(e) = MockSmtpServer::handle_client(stream, script, commands).await {
                        tracing::debug!("Mock server client error: {e}");
                    }
                });
            }
        });

        Ok(MockSmtpServer {
            addr,
            commands,
            shutdown,
        })
    }
}
