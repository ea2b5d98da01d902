//! Mailbox and header address validation for queued messages.
//!
//! A queued `from`/`to`/`cc`/`bcc` entry is free text: a bare mailbox
//! (`user@example.com`), an angle-addr (`<user@example.com>`) or a name-addr
//! (`Jane Doe <user@example.com>`). Mailboxes follow RFC 5321 §4.1.2:
//!
//! ```text
//! Mailbox    = Local-part "@" ( Domain / address-literal )
//! Local-part = Dot-string / Quoted-string
//! Domain     = sub-domain *("." sub-domain)
//! ```
//!
//! The local part is limited to 64 octets and the domain to 255.

use std::{
    fmt,
    net::{Ipv4Addr, Ipv6Addr},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_LOCAL_PART: usize = 64;
const MAX_DOMAIN: usize = 255;

pub type Result<T> = std::result::Result<T, AddressError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,
    #[error("no '@' between local part and domain")]
    MissingAtSign,
    #[error("local part is longer than {MAX_LOCAL_PART} octets")]
    LocalPartTooLong,
    #[error("domain is longer than {MAX_DOMAIN} octets")]
    DomainTooLong,
    #[error("'<' is never closed")]
    MissingCloseBracket,
    #[error("text after the closing '>': {0}")]
    TrailingText(String),
    #[error("bad local part: {0}")]
    InvalidLocalPart(String),
    #[error("quoted local part is never closed")]
    UnclosedQuotedString,
    #[error("bad domain: {0}")]
    InvalidDomain(String),
    #[error("bad address literal: {0}")]
    InvalidAddressLiteral(String),
    #[error("bad display name: {0}")]
    InvalidDisplayName(String),
}

/// `local-part@domain`, both kept exactly as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mailbox {
    pub local_part: String,
    /// A domain name or a bracketed address literal.
    pub domain: String,
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

/// Parses a header address into its display name (unquoted) and mailbox.
///
/// # Errors
///
/// Returns `AddressError` if the mailbox or the display name is malformed.
pub fn parse_name_addr(input: &str) -> Result<(Option<String>, Mailbox)> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AddressError::Empty);
    }

    let Some(open) = position_outside_quotes(input, '<') else {
        return Ok((None, parse_mailbox(input)?));
    };

    let (name, angle) = (&input[..open], &input[open + 1..]);
    let close = angle.find('>').ok_or(AddressError::MissingCloseBracket)?;

    let trailing = angle[close + 1..].trim();
    if !trailing.is_empty() {
        return Err(AddressError::TrailingText(trailing.to_string()));
    }

    let mailbox = parse_mailbox(angle[..close].trim())?;
    Ok((parse_display_name(name.trim())?, mailbox))
}

/// Parses `local-part@domain` or `local-part@[address-literal]`.
///
/// # Errors
///
/// Returns `AddressError` if `input` is not a valid mailbox.
pub fn parse_mailbox(input: &str) -> Result<Mailbox> {
    if input.is_empty() {
        return Err(AddressError::Empty);
    }

    // The last '@' that is not quoted or inside a literal splits the two.
    let at = unquoted(input)
        .filter(|&(_, ch)| ch == '@')
        .last()
        .map(|(i, _)| i)
        .ok_or(AddressError::MissingAtSign)?;
    let (local_part, domain) = (&input[..at], &input[at + 1..]);

    if local_part.len() > MAX_LOCAL_PART {
        return Err(AddressError::LocalPartTooLong);
    }
    if domain.len() > MAX_DOMAIN {
        return Err(AddressError::DomainTooLong);
    }

    check_local_part(local_part)?;
    check_domain(domain)?;

    Ok(Mailbox {
        local_part: local_part.to_string(),
        domain: domain.to_string(),
    })
}

#[derive(Clone, Copy)]
enum Scan {
    Plain,
    Quoted,
    Escaped,
    Literal,
}

/// Characters of `input` that sit outside quoted strings and `[...]`
/// literals, with their byte offsets. Delimiters themselves are skipped.
fn unquoted(input: &str) -> impl Iterator<Item = (usize, char)> + '_ {
    let mut state = Scan::Plain;
    input.char_indices().filter(move |&(_, ch)| {
        let (next, visible) = match (state, ch) {
            (Scan::Plain, '"') => (Scan::Quoted, false),
            (Scan::Plain, '[') => (Scan::Literal, false),
            (Scan::Plain, _) => (Scan::Plain, true),
            (Scan::Quoted, '\\') => (Scan::Escaped, false),
            (Scan::Quoted, '"') | (Scan::Literal, ']') => (Scan::Plain, false),
            (Scan::Escaped, _) | (Scan::Quoted, _) => (Scan::Quoted, false),
            (Scan::Literal, _) => (Scan::Literal, false),
        };
        state = next;
        visible
    })
}

fn position_outside_quotes(input: &str, needle: char) -> Option<usize> {
    unquoted(input).find(|&(_, ch)| ch == needle).map(|(i, _)| i)
}

/// A quoted display name is unescaped; a bare one may not contain header
/// specials or control characters.
fn parse_display_name(input: &str) -> Result<Option<String>> {
    let invalid = || AddressError::InvalidDisplayName(input.to_string());

    if input.is_empty() {
        return Ok(None);
    }

    let Some(quoted) = input.strip_prefix('"') else {
        if input
            .chars()
            .any(|ch| ch.is_control() || matches!(ch, '"' | '<' | '>' | '@' | ',' | ';'))
        {
            return Err(invalid());
        }
        return Ok(Some(input.to_string()));
    };

    let inner = quoted.strip_suffix('"').ok_or_else(invalid)?;
    let mut name = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => name.push(chars.next().ok_or_else(invalid)?),
            '"' | '\r' | '\n' => return Err(invalid()),
            _ => name.push(ch),
        }
    }

    Ok(Some(name))
}

fn check_local_part(local: &str) -> Result<()> {
    if local.is_empty() {
        return Err(AddressError::InvalidLocalPart("empty".to_string()));
    }

    if let Some(quoted) = local.strip_prefix('"') {
        return check_quoted_local_part(quoted);
    }

    if local.split('.').any(str::is_empty) {
        return Err(AddressError::InvalidLocalPart(format!(
            "'{local}' has an empty atom"
        )));
    }

    match local.chars().find(|&ch| ch != '.' && !is_atext(ch)) {
        Some(ch) => Err(AddressError::InvalidLocalPart(format!(
            "'{ch}' is not allowed unquoted"
        ))),
        None => Ok(()),
    }
}

/// `quoted` is everything after the opening quote.
fn check_quoted_local_part(quoted: &str) -> Result<()> {
    let mut chars = quoted.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if chars.as_str().is_empty() => return Ok(()),
            '"' => {
                return Err(AddressError::InvalidLocalPart(
                    "text after the closing quote".to_string(),
                ));
            }
            '\\' => match chars.next() {
                Some(' '..='~') => {}
                Some(escaped) => {
                    return Err(AddressError::InvalidLocalPart(format!(
                        "'\\{escaped}' is not a valid escape"
                    )));
                }
                None => break,
            },
            ' ' | '!' | '#'..='[' | ']'..='~' => {}
            other => {
                return Err(AddressError::InvalidLocalPart(format!(
                    "'{other}' is not allowed in a quoted local part"
                )));
            }
        }
    }

    Err(AddressError::UnclosedQuotedString)
}

fn check_domain(domain: &str) -> Result<()> {
    if let Some(literal) = domain.strip_prefix('[') {
        return check_address_literal(literal);
    }

    if domain.is_empty() {
        return Err(AddressError::InvalidDomain("empty".to_string()));
    }

    domain.split('.').try_for_each(|label| {
        let bytes = label.as_bytes();
        let edges_ok = matches!(
            (bytes.first(), bytes.last()),
            (Some(first), Some(last)) if first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric()
        );

        if edges_ok && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-') {
            Ok(())
        } else {
            Err(AddressError::InvalidDomain(format!(
                "'{label}' is not a valid label in '{domain}'"
            )))
        }
    })
}

/// `literal` is everything after the opening bracket.
fn check_address_literal(literal: &str) -> Result<()> {
    let invalid = || AddressError::InvalidAddressLiteral(format!("[{literal}"));
    let content = literal.strip_suffix(']').ok_or_else(invalid)?;

    if content.parse::<Ipv4Addr>().is_ok() {
        return Ok(());
    }

    match content.split_once(':') {
        Some(("IPv6", address)) if address.parse::<Ipv6Addr>().is_ok() => Ok(()),
        Some(("IPv6", _)) | None => Err(invalid()),
        Some((tag, value)) => {
            let tag_ok = !tag.is_empty()
                && tag.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-');
            let value_ok = !value.is_empty()
                && value
                    .chars()
                    .all(|ch| matches!(ch, '!'..='Z' | '^'..='~'));

            if tag_ok && value_ok { Ok(()) } else { Err(invalid()) }
        }
    }
}

/// RFC 5322 `atext`.
fn is_atext(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || "!#$%&'*+-/=?^_`{|}~".contains(ch)
}
