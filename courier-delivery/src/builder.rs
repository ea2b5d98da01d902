//! Turns a queued entity into a validated [`MailMessage`].

use std::{fs::File, path::PathBuf, sync::Arc};

use courier_common::{
    address::{Address, AddressList},
    log_sink::{self, LogType},
};
use courier_smtp::client::{BodyFormat, Priority};

use crate::{
    config::Configuration,
    entity::MessageQueueEntity,
    error::{BuildError, DispatchError},
};

/// A message ready for a [`crate::Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub from: Address,
    pub to: AddressList,
    pub cc: AddressList,
    /// Enveloped but never written to the headers.
    pub bcc: AddressList,
    pub subject: String,
    pub body: String,
    pub body_format: BodyFormat,
    pub priority: Priority,
    pub attachments: Vec<MessageAttachment>,
}

impl MailMessage {
    /// Every envelope recipient, `to` first, then `cc`, then `bcc`.
    pub fn recipients(&self) -> impl Iterator<Item = &Address> {
        self.to.iter().chain(self.cc.iter()).chain(self.bcc.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageAttachment {
    /// Read from disk when the message is rendered. Without a content type
    /// one is guessed from the extension.
    File {
        path: PathBuf,
        content_type: Option<String>,
    },
    Content {
        name: String,
        content_type: String,
        content: Arc<[u8]>,
    },
}

/// Builds the message for `entity`.
///
/// A validation failure is logged as a warning, recorded on the entity, and
/// reported as `Ok(None)`.
///
/// # Errors
///
/// Returns `DispatchError::MissingAttachmentContentType` if an in-memory
/// attachment has no content type, or `DispatchError::AttachmentUnreadable`
/// if a file attachment can't be opened. Either aborts the whole batch.
pub fn build_message(
    config: &Configuration,
    entity: &mut MessageQueueEntity,
) -> Result<Option<MailMessage>, DispatchError> {
    let (from, to, cc, bcc) = match validate_addresses(config, entity) {
        Ok(addresses) => addresses,
        Err(error) => {
            log_sink::write(config.log_sink(), LogType::Warning, &error.to_string());
            entity.sent_exception = Some(error.into());
            return Ok(None);
        }
    };

    let attachments = collect_attachments(entity)?;

    Ok(Some(MailMessage {
        from,
        to,
        cc,
        bcc,
        subject: entity.subject.clone(),
        body: entity.body.clone(),
        body_format: entity.body_format,
        priority: entity.priority,
        attachments,
    }))
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn validate_addresses(
    config: &Configuration,
    entity: &MessageQueueEntity,
) -> Result<(Address, AddressList, AddressList, AddressList), BuildError> {
    let default_from = config.default_from_address();

    if is_blank(&entity.from) && default_from.is_none() {
        return Err(BuildError::FromAddressNotConfigured);
    }

    if is_blank(&entity.to) {
        return Err(BuildError::ToAddressNotSet);
    }

    let from = match default_from {
        Some(default) if is_blank(&entity.from) => {
            Address::with_display_name(&default.address, default.display_name.as_deref())
        }
        _ => entity.from.parse(),
    }
    .map_err(|_| BuildError::FromAddressInvalid)?;

    let to = AddressList::parse_delimited(&entity.to).map_err(|_| BuildError::ToAddressInvalid)?;
    let cc = AddressList::parse_delimited(&entity.cc).map_err(|_| BuildError::CcAddressInvalid)?;
    let bcc =
        AddressList::parse_delimited(&entity.bcc).map_err(|_| BuildError::BccAddressInvalid)?;

    Ok((from, to, cc, bcc))
}

fn collect_attachments(entity: &MessageQueueEntity) -> Result<Vec<MessageAttachment>, DispatchError> {
    let mut attachments = Vec::with_capacity(entity.attachments.len());

    // Content attachments are named by their position in the entity's list.
    for (position, attachment) in (1..).zip(&entity.attachments) {
        if let Some(path) = attachment
            .file_name
            .as_ref()
            .filter(|path| !path.as_os_str().is_empty())
        {
            File::open(path).map_err(|source| DispatchError::AttachmentUnreadable {
                message_id: entity.id.clone(),
                path: path.clone(),
                source,
            })?;

            attachments.push(MessageAttachment::File {
                path: path.clone(),
                content_type: attachment.content_type.clone(),
            });
        } else if let Some(content) = &attachment.content {
            let content_type = attachment.content_type.clone().ok_or_else(|| {
                DispatchError::MissingAttachmentContentType {
                    message_id: entity.id.clone(),
                }
            })?;

            attachments.push(MessageAttachment::Content {
                name: format!("attachment-{position}"),
                content_type,
                content: Arc::clone(content),
            });
        }
    }

    Ok(attachments)
}
