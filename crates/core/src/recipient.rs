//! Recipients and their engagement/compliance standing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::flags::{Flag, FlagSet};
use crate::id::RecipientId;

const TOKEN_SALT: &str = "warmsend:recipient-token";

/// Engagement and compliance flags of a recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecipientFlag {
    Deleted,
    /// Part of the seed audience used to warm up new identities.
    Warmup,
    Delivered,
    Open,
    Click,
    Dropped,
    Failed,
    Unsubscribe,
    Deferred,
    Bounce,
    Spam,
}

impl Flag for RecipientFlag {
    const ALL: &'static [Self] = &[
        RecipientFlag::Deleted,
        RecipientFlag::Warmup,
        RecipientFlag::Delivered,
        RecipientFlag::Open,
        RecipientFlag::Click,
        RecipientFlag::Dropped,
        RecipientFlag::Failed,
        RecipientFlag::Unsubscribe,
        RecipientFlag::Deferred,
        RecipientFlag::Bounce,
        RecipientFlag::Spam,
    ];

    // Bit 2 is retired and must stay unused.
    fn bit(self) -> i64 {
        match self {
            RecipientFlag::Deleted => 1,
            RecipientFlag::Warmup => 1 << 1,
            RecipientFlag::Delivered => 1 << 3,
            RecipientFlag::Open => 1 << 4,
            RecipientFlag::Click => 1 << 5,
            RecipientFlag::Dropped => 1 << 6,
            RecipientFlag::Failed => 1 << 7,
            RecipientFlag::Unsubscribe => 1 << 8,
            RecipientFlag::Deferred => 1 << 9,
            RecipientFlag::Bounce => 1 << 10,
            RecipientFlag::Spam => 1 << 11,
        }
    }
}

/// Flags that permanently exclude a recipient from scheduling.
pub fn do_not_email() -> FlagSet<RecipientFlag> {
    FlagSet::of(&[
        RecipientFlag::Deleted,
        RecipientFlag::Unsubscribe,
        RecipientFlag::Failed,
        RecipientFlag::Dropped,
        RecipientFlag::Bounce,
        RecipientFlag::Spam,
    ])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: RecipientId,
    pub email: String,
    /// Opaque bearer token used by unsubscribe links.
    pub token: String,
    pub flags: FlagSet<RecipientFlag>,
    pub validated_at: Option<DateTime<Utc>>,
    pub disabled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Recipient {
    pub fn new(email: impl Into<String>, warmup: bool, now: DateTime<Utc>) -> Self {
        let id = RecipientId::new();
        let email = email.into().trim().to_string();
        let token = generate_token(id, &email, now);
        let mut flags = FlagSet::empty();
        if warmup {
            flags.insert(RecipientFlag::Warmup);
        }

        Self {
            id,
            email,
            token,
            flags,
            validated_at: None,
            disabled_at: None,
            created_at: now,
        }
    }

    pub fn is_do_not_email(&self) -> bool {
        self.flags.intersects(do_not_email())
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled_at.is_some()
    }

    pub fn is_validated(&self) -> bool {
        self.validated_at.is_some()
    }

    /// Validated, not disabled and not excluded by its flags.
    pub fn is_reachable(&self) -> bool {
        self.is_validated() && !self.is_disabled() && !self.is_do_not_email()
    }
}

/// Hex SHA-256 over salt, creation time, id and address.
pub fn generate_token(id: RecipientId, email: &str, now: DateTime<Utc>) -> String {
    let nanos = now.timestamp_nanos_opt().unwrap_or_else(|| now.timestamp_micros());
    let mut hasher = Sha256::new();
    hasher.update(format!("{TOKEN_SALT}{nanos}:{id}:{email}").as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Cheap syntactic check run before paying for remote validation.
pub fn looks_like_email(address: &str) -> bool {
    let address = address.trim();
    if address.is_empty() || address.len() > 254 {
        return false;
    }
    if address.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return false;
    }

    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    if local.is_empty() || local.len() > 64 || domain.contains('@') {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persisted_bits_match_column_layout() {
        assert_eq!(do_not_email().bits(), 1 | 256 | 128 | 64 | 1024 | 2048);
        assert_eq!(FlagSet::from(RecipientFlag::Delivered).bits(), 8);
        assert_eq!(FlagSet::from(RecipientFlag::Spam).bits(), 2048);
        // bit 4 is never assigned
        assert!(RecipientFlag::ALL.iter().all(|f| f.bit() != 4));
    }

    #[test]
    fn token_is_64_hex_chars_and_unique_per_recipient() {
        let now = Utc::now();
        let a = Recipient::new("a@example.com", false, now);
        let b = Recipient::new("a@example.com", false, now);
        assert_eq!(a.token.len(), 64);
        assert!(a.token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn warmup_recipient_carries_flag() {
        let r = Recipient::new("  seed@example.com ", true, Utc::now());
        assert_eq!(r.email, "seed@example.com");
        assert!(r.flags.contains(RecipientFlag::Warmup));
        assert!(!r.is_reachable());
    }

    #[test]
    fn each_do_not_email_flag_excludes() {
        for flag in do_not_email().iter() {
            let mut r = Recipient::new("x@example.com", false, Utc::now());
            r.flags.insert(flag);
            assert!(r.is_do_not_email(), "{flag:?} should exclude");
        }
        let mut r = Recipient::new("x@example.com", false, Utc::now());
        r.flags.insert(RecipientFlag::Open);
        r.flags.insert(RecipientFlag::Deferred);
        assert!(!r.is_do_not_email());
    }

    #[test]
    fn plausibility_check() {
        assert!(looks_like_email("jane.doe+news@mail.example.co"));
        assert!(!looks_like_email("jane.doe@localhost"));
        assert!(!looks_like_email("@example.com"));
        assert!(!looks_like_email("jane@@example.com"));
        assert!(!looks_like_email("jane doe@example.com"));
        assert!(!looks_like_email("jane@example..com"));
        assert!(!looks_like_email(""));
    }
}
