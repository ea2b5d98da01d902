//! Relaying through an SMTP server with the courier SMTP client.

use async_trait::async_trait;
use courier_common::{address::Address, internal, tracing};
use courier_smtp::client::{AuthMechanism, MessageBuilder, Response, SmtpClient, encode_word};

use super::{SendCompleted, SendCompletedHook, Transport};
use crate::{
    builder::{MailMessage, MessageAttachment},
    config::ServerSettings,
    error::{DispatchError, TransportError},
};

/// Sends each message over its own SMTP session with the configured relay.
pub struct SmtpTransport {
    settings: ServerSettings,
    send_completed: Option<SendCompletedHook>,
}

impl SmtpTransport {
    /// # Errors
    ///
    /// Returns `DispatchError::TransportSetup` if no relay host or port is
    /// configured.
    pub fn new(settings: ServerSettings) -> Result<Self, DispatchError> {
        if settings.host.trim().is_empty() {
            return Err(DispatchError::TransportSetup(
                "no SMTP host is configured".to_string(),
            ));
        }

        if settings.port == 0 {
            return Err(DispatchError::TransportSetup(format!(
                "invalid port 0 for SMTP host {}",
                settings.host
            )));
        }

        if settings.accept_invalid_certs {
            tracing::warn!(
                host = %settings.host,
                "SECURITY WARNING: TLS certificate validation is disabled for this relay"
            );
        }

        Ok(Self {
            settings,
            send_completed: None,
        })
    }

    /// Calls `hook` after every send attempt.
    #[must_use]
    pub fn with_send_completed(mut self, hook: Option<SendCompletedHook>) -> Self {
        self.send_completed = hook;
        self
    }

    #[must_use]
    pub const fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    async fn deliver(&self, message: &MailMessage) -> Result<(), TransportError> {
        let recipients: Vec<String> = message.recipients().map(Address::envelope).collect();
        if recipients.is_empty() {
            return Err(TransportError::invalid_operation(
                "A recipient must be specified.",
            ));
        }

        if self.settings.require_login && self.settings.username.trim().is_empty() {
            return Err(TransportError::invalid_operation(
                "The relay requires a login but no username is configured.",
            ));
        }

        let data = render(message).await?;

        internal!(
            level = DEBUG,
            "Relaying message for {} recipient(s) via {}",
            recipients.len(),
            self.settings.address()
        );

        let mut client = self.connect().await?;
        self.handshake(&mut client).await?;

        client
            .mail_from(&message.from.envelope())
            .await?
            .expect(Response::is_success)?;

        let mut rejected = Vec::new();
        let mut replies = Vec::new();
        for recipient in &recipients {
            let response = client.rcpt_to(recipient).await?;
            if !response.is_success() {
                replies.push(format!(
                    "{recipient} ({} {})",
                    response.code,
                    response.message()
                ));
                rejected.push(recipient.clone());
            }
        }

        if rejected.len() == recipients.len() {
            if let Err(error) = client.quit().await {
                tracing::debug!(%error, "QUIT failed after every recipient was refused");
            }
            return Err(recipients_rejected(rejected, &replies));
        }

        client.data().await?.expect(Response::is_intermediate)?;
        client.send_data(&data).await?.expect(Response::is_success)?;

        // The relay already owns the message at this point.
        if let Err(error) = client.quit().await {
            tracing::debug!(%error, "QUIT failed after the message was accepted");
        }

        if rejected.is_empty() {
            Ok(())
        } else {
            Err(recipients_rejected(rejected, &replies))
        }
    }

    async fn connect(&self) -> Result<SmtpClient, TransportError> {
        let mut client = SmtpClient::connect(&self.settings.address(), self.settings.host.clone())
            .await?
            .accept_invalid_certs(self.settings.accept_invalid_certs);

        client.read_greeting().await?.expect(Response::is_success)?;
        Ok(client)
    }

    /// EHLO, then STARTTLS and AUTH as configured.
    async fn handshake(&self, client: &mut SmtpClient) -> Result<(), TransportError> {
        let mut capabilities = self.greet(client).await?;

        if self.settings.ssl {
            if !capabilities.advertises("STARTTLS") {
                return Err(TransportError::protocol(
                    "Server does not support secure connections.",
                ));
            }

            client.starttls().await?.expect(Response::is_success)?;
            capabilities = self.greet(client).await?;
        }

        if self.settings.require_login {
            client
                .authenticate(
                    AuthMechanism::select(&capabilities),
                    &self.settings.username,
                    &self.settings.password,
                )
                .await?;
        }

        Ok(())
    }

    /// Sends EHLO, falling back to HELO for servers without ESMTP.
    async fn greet(&self, client: &mut SmtpClient) -> Result<Response, TransportError> {
        let response = client.ehlo(&self.settings.helo_name).await?;
        if response.is_success() {
            return Ok(response);
        }

        Ok(client
            .helo(&self.settings.helo_name)
            .await?
            .expect(Response::is_success)?)
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(&mut self, message: &MailMessage) -> Result<(), TransportError> {
        let outcome = match self.settings.timeout() {
            Some(limit) => tokio::time::timeout(limit, self.deliver(message))
                .await
                .unwrap_or_else(|_| {
                    Err(TransportError::protocol(format!(
                        "The operation has timed out after {limit:?}."
                    )))
                }),
            None => self.deliver(message).await,
        };

        if let Some(hook) = &self.send_completed {
            hook(&SendCompleted {
                recipients: message.recipients().map(Address::envelope).collect(),
                subject: message.subject.clone(),
                error: outcome.as_ref().err().cloned(),
            });
        }

        outcome
    }
}

fn recipients_rejected(failed: Vec<String>, replies: &[String]) -> TransportError {
    TransportError::recipients_rejected(
        failed,
        format!(
            "The server rejected the following recipients: {}",
            replies.join(", ")
        ),
    )
}

/// Formats a header address, encoding non-ASCII display names.
fn header_address(address: &Address) -> String {
    match &address.display_name {
        Some(name) if !name.is_ascii() => format!("{} <{}>", encode_word(name), address.mailbox),
        _ => address.to_string(),
    }
}

async fn render(message: &MailMessage) -> Result<String, TransportError> {
    let mut builder = MessageBuilder::new()
        .from(header_address(&message.from))
        .subject(message.subject.as_str())
        .body(message.body.as_str())
        .format(message.body_format)
        .priority(message.priority);

    for address in message.to.iter() {
        builder = builder.to(header_address(address));
    }
    for address in message.cc.iter() {
        builder = builder.cc(header_address(address));
    }

    for attachment in &message.attachments {
        builder = match attachment {
            MessageAttachment::File { path, content_type } => {
                builder.attach_file(path, content_type.as_deref()).await?
            }
            MessageAttachment::Content {
                name,
                content_type,
                content,
            } => builder.attach(name.as_str(), content_type.as_str(), content.to_vec()),
        };
    }

    Ok(builder.build()?)
}
