//! Test-account suppression.

use crate::{config::Configuration, entity::MessageQueueEntity};

/// Whether `entity` should be suppressed as a test email instead of sent.
///
/// Always `false` while suppression is disabled. Otherwise a message already
/// flagged as a test email stays one, and a message whose `to` is missing any
/// one of the configured account substrings (compared case-insensitively) is
/// flagged. Messages matching every configured substring are sent.
pub fn is_test_email_detected(config: &Configuration, entity: &MessageQueueEntity) -> bool {
    if !config.test_accounts.enabled {
        return false;
    }

    if entity.is_test_email {
        return true;
    }

    let to = entity.to.to_lowercase();
    config
        .test_accounts
        .accounts
        .iter()
        .any(|account| !to.contains(&account.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn config(enabled: bool, accounts: &[&str]) -> Configuration {
        Configuration::new().ignore_test_accounts(enabled, accounts.iter().copied())
    }

    fn to(address: &str) -> MessageQueueEntity {
        MessageQueueEntity::new("1", address, Utc::now())
    }

    #[test]
    fn test_disabled_never_detects() {
        let mut flagged = to("qa@test.example.com");
        flagged.is_test_email = true;

        assert!(!is_test_email_detected(&config(false, &["test.example.com"]), &flagged));
    }

    #[test]
    fn test_existing_flag_is_kept() {
        let mut flagged = to("someone@example.com");
        flagged.is_test_email = true;

        assert!(is_test_email_detected(&config(true, &[]), &flagged));
        assert!(is_test_email_detected(&config(true, &["example.com"]), &flagged));
    }

    #[test]
    fn test_empty_account_list_uses_flag_only() {
        assert!(!is_test_email_detected(&config(true, &[]), &to("someone@example.com")));
    }

    // A recipient that does not match the configured substring is the one
    // treated as a test email.
    #[test]
    fn test_unmatched_recipient_is_suppressed() {
        let config = config(true, &["@test.example.com"]);

        assert!(is_test_email_detected(&config, &to("customer@example.org")));
        assert!(!is_test_email_detected(&config, &to("QA@Test.Example.com")));
    }

    // Reading the list as "known test domains to suppress" would give the
    // opposite answers; these pin down that it does not work that way.
    #[test]
    fn test_listed_domain_is_not_suppressed() {
        let config = config(true, &["@test.example.com"]);

        assert!(!is_test_email_detected(&config, &to("qa@test.example.com")));
        assert!(is_test_email_detected(&config, &to("real.customer@example.org")));
    }

    #[test]
    fn test_every_substring_must_match() {
        let config = config(true, &["example", "qa"]);

        assert!(!is_test_email_detected(&config, &to("qa@example.com")));
        assert!(is_test_email_detected(&config, &to("ops@example.com")));
    }
}
