//! Sending identities: outbound sender profiles and their warm-up state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::flags::{Flag, FlagSet};
use crate::id::IdentityId;

/// Lifecycle flags of a sending identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityFlag {
    Deleted,
    /// Plain-text warm-up batch has been scheduled.
    TextWarm,
    /// HTML warm-up batch has been scheduled; HTML bodies are sent from now on.
    HtmlWarm,
    Paused,
}

impl Flag for IdentityFlag {
    const ALL: &'static [Self] = &[
        IdentityFlag::Deleted,
        IdentityFlag::TextWarm,
        IdentityFlag::HtmlWarm,
        IdentityFlag::Paused,
    ];

    fn bit(self) -> i64 {
        match self {
            IdentityFlag::Deleted => 1,
            IdentityFlag::TextWarm => 1 << 1,
            IdentityFlag::HtmlWarm => 1 << 2,
            IdentityFlag::Paused => 1 << 3,
        }
    }
}

/// Provider credentials and envelope addresses for one identity.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityAttrs {
    pub api_token: String,
    pub category: String,
    pub ip_pool: String,
    pub from_email: String,
    pub from_name: String,
    pub reply_email: String,
    pub reply_name: String,
}

impl core::fmt::Debug for IdentityAttrs {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IdentityAttrs")
            .field("api_token", &"<redacted>")
            .field("category", &self.category)
            .field("ip_pool", &self.ip_pool)
            .field("from_email", &self.from_email)
            .field("from_name", &self.from_name)
            .field("reply_email", &self.reply_email)
            .field("reply_name", &self.reply_name)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendingIdentity {
    pub id: IdentityId,
    pub attrs: IdentityAttrs,
    pub flags: FlagSet<IdentityFlag>,
    pub created_at: DateTime<Utc>,
}

impl SendingIdentity {
    pub fn new(attrs: IdentityAttrs, created_at: DateTime<Utc>) -> Self {
        Self {
            id: IdentityId::new(),
            attrs,
            flags: FlagSet::empty(),
            created_at,
        }
    }

    /// Flags that exclude an identity from every scheduler.
    pub fn inactive_flags() -> FlagSet<IdentityFlag> {
        FlagSet::of(&[IdentityFlag::Deleted, IdentityFlag::Paused])
    }

    pub fn is_active(&self) -> bool {
        !self.flags.intersects(Self::inactive_flags())
    }

    /// Both warm-up phases have been scheduled.
    pub fn is_fully_warm(&self) -> bool {
        self.flags
            .contains_all(FlagSet::of(&[IdentityFlag::TextWarm, IdentityFlag::HtmlWarm]))
    }

    /// HTML bodies are only rendered once the HTML warm-up phase started.
    pub fn sends_html(&self) -> bool {
        self.flags.contains(IdentityFlag::HtmlWarm)
    }

    /// The warm-up phase the next warm-up batch advances to.
    pub fn next_warmup_phase(&self) -> Option<IdentityFlag> {
        if !self.flags.contains(IdentityFlag::TextWarm) {
            Some(IdentityFlag::TextWarm)
        } else if !self.flags.contains(IdentityFlag::HtmlWarm) {
            Some(IdentityFlag::HtmlWarm)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(flags: &[IdentityFlag]) -> SendingIdentity {
        let mut identity = SendingIdentity::new(IdentityAttrs::default(), Utc::now());
        identity.flags = FlagSet::of(flags);
        identity
    }

    #[test]
    fn warmup_phases_advance_text_then_html() {
        assert_eq!(identity(&[]).next_warmup_phase(), Some(IdentityFlag::TextWarm));
        assert_eq!(
            identity(&[IdentityFlag::TextWarm]).next_warmup_phase(),
            Some(IdentityFlag::HtmlWarm)
        );
        let warm = identity(&[IdentityFlag::TextWarm, IdentityFlag::HtmlWarm]);
        assert_eq!(warm.next_warmup_phase(), None);
        assert!(warm.is_fully_warm());
    }

    #[test]
    fn html_only_after_html_warmup() {
        assert!(!identity(&[IdentityFlag::TextWarm]).sends_html());
        assert!(identity(&[IdentityFlag::HtmlWarm]).sends_html());
    }

    #[test]
    fn persisted_bits_match_column_layout() {
        let all = FlagSet::of(IdentityFlag::ALL);
        assert_eq!(all.bits(), 0b1111);
        assert_eq!(FlagSet::from(IdentityFlag::Paused).bits(), 8);
    }

    #[test]
    fn debug_never_prints_api_token() {
        let attrs = IdentityAttrs {
            api_token: "SG.secret".into(),
            ..IdentityAttrs::default()
        };
        assert!(!format!("{attrs:?}").contains("SG.secret"));
    }
}
