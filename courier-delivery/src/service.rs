//! Batch entry points.
//!
//! [`execute`] sends through the configured SMTP relay. [`execute_with`]
//! accepts any [`Transport`] and [`Clock`], which is how hosts plug in
//! their own delivery or drive a batch in tests.

use courier_common::{
    clock::{Clock, SystemClock},
    internal, tracing,
};

use crate::{
    config::Configuration,
    driver::send_queued_emails,
    error::DispatchError,
    result::NotificationResult,
    transport::{SmtpTransport, Transport},
};

/// Sends every message in `config.emails` through the configured relay.
///
/// The caller's queue is left untouched; the processed copy is returned in
/// the result.
pub async fn execute(config: &Configuration) -> NotificationResult {
    execute_with(
        config,
        |config| {
            Ok(SmtpTransport::new(config.server.clone())?
                .with_send_completed(config.send_completed.clone()))
        },
        &SystemClock,
    )
    .await
}

/// As [`execute`], with the transport built by `make_transport` and time
/// taken from `clock`.
///
/// The transport is only built when there is something to send.
pub async fn execute_with<T, F>(
    config: &Configuration,
    make_transport: F,
    clock: &dyn Clock,
) -> NotificationResult
where
    T: Transport,
    F: FnOnce(&Configuration) -> Result<T, DispatchError>,
{
    if !config.enabled {
        internal!(level = DEBUG, "Email notifications are disabled, skipping batch");
        return NotificationResult::new(config.emails.clone(), false);
    }

    if config.emails.is_empty() {
        return NotificationResult::new(Vec::new(), true);
    }

    let mut emails = config.emails.clone();
    internal!(level = INFO, "Processing {} queued email(s)", emails.len());

    let outcome = match make_transport(config) {
        Ok(mut transport) => send_queued_emails(config, &mut emails, &mut transport, clock).await,
        Err(error) => Err(error),
    };

    match outcome {
        Ok(()) => NotificationResult::new(emails, true),
        Err(error) => {
            tracing::error!(%error, "Email notification batch abandoned");
            NotificationResult::new(emails, false)
        }
    }
}
