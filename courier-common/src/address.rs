use std::{
    fmt::{self, Display},
    ops::{Deref, DerefMut},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::address_parser::{self, AddressError, Mailbox};

/// Separators accepted between addresses in a queued address string.
pub const ADDRESS_SEPARATORS: [char; 2] = [';', ','];

/// A header address: a mailbox with an optional display name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub display_name: Option<String>,
    pub mailbox: Mailbox,
}

impl Address {
    /// Parses `input` and, if it carries no display name of its own, applies
    /// `display_name` instead.
    ///
    /// # Errors
    ///
    /// Returns `AddressError` if `input` is not a valid address.
    pub fn with_display_name(input: &str, display_name: Option<&str>) -> Result<Self, AddressError> {
        let mut address = input.parse::<Self>()?;
        if address.display_name.is_none() {
            address.display_name = display_name
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(ToString::to_string);
        }
        Ok(address)
    }

    /// The bare `local@domain` form used on the SMTP envelope.
    #[must_use]
    pub fn envelope(&self) -> String {
        self.mailbox.to_string()
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (display_name, mailbox) = address_parser::parse_name_addr(s)?;
        Ok(Self {
            display_name,
            mailbox,
        })
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.display_name {
            Some(name) => {
                let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "\"{escaped}\" <{}>", self.mailbox)
            }
            None => Display::fmt(&self.mailbox, f),
        }
    }
}

impl From<Mailbox> for Address {
    fn from(mailbox: Mailbox) -> Self {
        Self {
            display_name: None,
            mailbox,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressList(pub Vec<Address>);

impl AddressList {
    /// Parses every non-blank entry of a `;`/`,` separated address string.
    ///
    /// Parsing stops at the first invalid entry, so a list is either fully
    /// valid or rejected as a whole.
    ///
    /// # Errors
    ///
    /// Returns the `AddressError` of the first entry that fails to parse.
    pub fn parse_delimited(input: &str) -> Result<Self, AddressError> {
        split_addresses(input)
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl Display for AddressList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, addr) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            Display::fmt(addr, f)?;
        }
        Ok(())
    }
}

impl From<Vec<Address>> for AddressList {
    fn from(value: Vec<Address>) -> Self {
        Self(value)
    }
}

impl Deref for AddressList {
    type Target = Vec<Address>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for AddressList {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Splits a queued address string on `;` and `,`, skipping blank entries.
pub fn split_addresses(input: &str) -> impl Iterator<Item = &str> {
    input
        .split(ADDRESS_SEPARATORS)
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_split_mixed_separators() {
        let entries: Vec<_> = split_addresses("a@x.com; b@x.com,c@x.com;;  ").collect();
        assert_eq!(entries, vec!["a@x.com", "b@x.com", "c@x.com"]);
    }

    #[test]
    fn test_parse_delimited_list() {
        let list = AddressList::parse_delimited("a@x.com;Bee <b@x.com>").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].display_name.as_deref(), Some("Bee"));
        assert_eq!(list.to_string(), "a@x.com, \"Bee\" <b@x.com>");
    }

    #[test]
    fn test_parse_delimited_rejects_whole_list() {
        assert!(AddressList::parse_delimited("a@x.com;bad-email;c@x.com").is_err());
    }

    #[test]
    fn test_with_display_name_fallback() {
        let address = Address::with_display_name("store@x.com", Some("Store")).unwrap();
        assert_eq!(address.to_string(), "\"Store\" <store@x.com>");
        assert_eq!(address.envelope(), "store@x.com");

        let address = Address::with_display_name("Own <own@x.com>", Some("Store")).unwrap();
        assert_eq!(address.display_name.as_deref(), Some("Own"));

        let address = Address::with_display_name("own@x.com", Some("  ")).unwrap();
        assert_eq!(address.display_name, None);
    }
}
