//! The send loop.
//!
//! Messages are processed one at a time, most recently created first. Each
//! one ends the pass sent, suppressed as a test email, or carrying the reason
//! it failed. Per-message failures never stop the loop; only a
//! [`DispatchError`] does.

use std::time::Duration;

use courier_common::{
    clock::Clock,
    internal,
    log_sink::{self, LogType},
};

use crate::{
    builder::{MailMessage, build_message},
    config::Configuration,
    entity::MessageQueueEntity,
    error::{DispatchError, TransportError, TransportErrorKind},
    filter::is_test_email_detected,
    transport::Transport,
};

/// How long the loop pauses each time the connection limit is reached.
pub const THROTTLE_PAUSE: Duration = Duration::from_secs(15);

/// Processes every message in `queue`, recording the outcome on each entity.
///
/// # Errors
///
/// Returns a [`DispatchError`] if the batch has to be abandoned. Entities
/// processed so far keep their outcome.
pub async fn send_queued_emails(
    config: &Configuration,
    queue: &mut [MessageQueueEntity],
    transport: &mut dyn Transport,
    clock: &dyn Clock,
) -> Result<(), DispatchError> {
    if queue.is_empty() {
        return Ok(());
    }

    queue.sort_by(|a, b| b.created.cmp(&a.created));

    let connection_limit = config.server.connection_limit;
    let mut connection_attempts: u32 = 0;

    for entity in queue.iter_mut() {
        entity.is_sent = false;
        entity.sent_exception = None;

        let Some(message) = build_message(config, entity)? else {
            internal!(level = DEBUG, "Message {} failed validation", entity.id);
            continue;
        };

        if is_test_email_detected(config, entity) {
            internal!(level = DEBUG, "Message {} suppressed as a test email", entity.id);
            entity.is_test_email = true;
            entity.is_sent = true;
            entity.sent = Some(clock.now());
            continue;
        }

        connection_attempts += 1;

        match transport.send(&message).await {
            Ok(()) => {
                internal!(level = DEBUG, "Message {} sent", entity.id);
                entity.is_sent = true;
                entity.sent = Some(clock.now());
            }
            Err(error) => report_failure(config, entity, &message, error),
        }

        if connection_limit > 0 && connection_attempts % connection_limit == 0 {
            internal!(
                level = DEBUG,
                "Reached {connection_attempts} send attempts, pausing for {THROTTLE_PAUSE:?}"
            );
            clock.sleep(THROTTLE_PAUSE).await;
        }
    }

    let sent = queue.iter().filter(|entity| entity.is_sent).count();
    log_sink::write(
        config.log_sink(),
        LogType::Information,
        &format!("Sent total of {sent} emails."),
    );

    Ok(())
}

/// Logs a failed send by kind and stores the error on the entity.
fn report_failure(
    config: &Configuration,
    entity: &mut MessageQueueEntity,
    message: &MailMessage,
    error: TransportError,
) {
    let recipients = message.to.to_string();

    let (log_type, text, dump) = match error.kind {
        TransportErrorKind::RecipientsRejected => (
            LogType::Warning,
            format!(
                "Email Notification: The message could not be delivered to the recipient for email {recipients}"
            ),
            false,
        ),
        TransportErrorKind::ArgumentInvalid => (
            LogType::Warning,
            format!("Email Notification: Your sender or recipient is null for email {recipients}."),
            false,
        ),
        TransportErrorKind::ArgumentOutOfRange => (
            LogType::Warning,
            format!("Email Notification: failed to send email to {recipients}."),
            false,
        ),
        TransportErrorKind::Protocol => (
            LogType::Error,
            format!(
                "Email Notification: A connection to the SMTP server failed. Failed to send email to {}.",
                entity.to
            ),
            true,
        ),
        TransportErrorKind::InvalidOperation => (
            LogType::Error,
            format!(
                "Email Notification: A delivery method configuration issue has occurred. Failed to send email to {recipients}."
            ),
            true,
        ),
        TransportErrorKind::Unclassified => (
            LogType::Error,
            format!("Email Notification: failed to send email to {recipients}."),
            true,
        ),
    };

    internal!(level = DEBUG, "Message {} failed: {error}", entity.id);
    log_sink::write_with(config.log_sink(), log_type, &text, &error);

    if dump && let Some(sink) = config.log_sink() {
        sink.error(&parameter_dump(config, entity, message));
    }

    entity.sent_exception = Some(error.into());
}

/// Server settings and message fields, written after serious failures.
fn parameter_dump(
    config: &Configuration,
    entity: &MessageQueueEntity,
    message: &MailMessage,
) -> String {
    let server = &config.server;
    format!(
        "Settings: Host: {}\nSSL: {}\nRequire Auth: {}\nUsername: {}\nPassword: {}\
         \n\nParameters: To: {}\nCC: {}\nBCC: {}\nSubject: {}\nBody: {}\nBody Format: {:?}\nFrom: {}",
        server.host,
        server.ssl,
        server.require_login,
        server.username,
        server.password,
        entity.to,
        entity.cc,
        entity.bcc,
        entity.subject,
        entity.body,
        entity.body_format,
        message.from.envelope(),
    )
}
