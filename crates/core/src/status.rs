//! Delivery statuses reported by the mail provider and the rules for applying them.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::recipient::RecipientFlag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    Processed,
    Delivered,
    Deferred,
    Dropped,
    Bounce,
    Blocked,
    Open,
    Click,
    #[serde(rename = "spamreport")]
    SpamReport,
    Unsubscribe,
    GroupUnsubscribe,
}

/// Statuses that may be recorded on an email, strongest first.
///
/// A status blocks every status below it. `Bounce` and `Blocked` are not on
/// the ladder.
pub const PRIORITY_LADDER: [EmailStatus; 9] = [
    EmailStatus::SpamReport,
    EmailStatus::Unsubscribe,
    EmailStatus::GroupUnsubscribe,
    EmailStatus::Dropped,
    EmailStatus::Click,
    EmailStatus::Open,
    EmailStatus::Delivered,
    EmailStatus::Deferred,
    EmailStatus::Processed,
];

impl EmailStatus {
    pub const ALL: [EmailStatus; 11] = [
        EmailStatus::Processed,
        EmailStatus::Delivered,
        EmailStatus::Deferred,
        EmailStatus::Dropped,
        EmailStatus::Bounce,
        EmailStatus::Blocked,
        EmailStatus::Open,
        EmailStatus::Click,
        EmailStatus::SpamReport,
        EmailStatus::Unsubscribe,
        EmailStatus::GroupUnsubscribe,
    ];

    /// Provider wire name; also the persisted value.
    pub fn as_str(self) -> &'static str {
        match self {
            EmailStatus::Processed => "processed",
            EmailStatus::Delivered => "delivered",
            EmailStatus::Deferred => "deferred",
            EmailStatus::Dropped => "dropped",
            EmailStatus::Bounce => "bounce",
            EmailStatus::Blocked => "blocked",
            EmailStatus::Open => "open",
            EmailStatus::Click => "click",
            EmailStatus::SpamReport => "spamreport",
            EmailStatus::Unsubscribe => "unsubscribe",
            EmailStatus::GroupUnsubscribe => "group_unsubscribe",
        }
    }

    /// Position on [`PRIORITY_LADDER`]; lower is stronger.
    pub fn rank(self) -> Option<usize> {
        PRIORITY_LADDER.iter().position(|s| *s == self)
    }

    /// Recipient flag recorded when this status is reported.
    pub fn recipient_flag(self) -> Option<RecipientFlag> {
        match self {
            EmailStatus::Processed => None,
            EmailStatus::Delivered => Some(RecipientFlag::Delivered),
            EmailStatus::Deferred => Some(RecipientFlag::Deferred),
            EmailStatus::Open => Some(RecipientFlag::Open),
            EmailStatus::Click => Some(RecipientFlag::Click),
            EmailStatus::Dropped => Some(RecipientFlag::Dropped),
            EmailStatus::Bounce => Some(RecipientFlag::Bounce),
            EmailStatus::Blocked => Some(RecipientFlag::Failed),
            EmailStatus::SpamReport => Some(RecipientFlag::Spam),
            EmailStatus::Unsubscribe | EmailStatus::GroupUnsubscribe => {
                Some(RecipientFlag::Unsubscribe)
            }
        }
    }
}

impl fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmailStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "group-unsubscribe" => Ok(EmailStatus::GroupUnsubscribe),
            "spam_report" | "spam-report" => Ok(EmailStatus::SpamReport),
            other => EmailStatus::ALL
                .into_iter()
                .find(|status| status.as_str() == other)
                .ok_or_else(|| DomainError::unknown_status(s)),
        }
    }
}

/// Outcome of offering a new status to an email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Apply(EmailStatus),
    Keep,
}

/// Decide whether `incoming` replaces `current`.
///
/// Walks the ladder from the top: the incoming status wins if it is reached
/// before the current one, an equal status is a no-op, and a current status
/// reached first blocks the change.
pub fn next_status(
    current: Option<EmailStatus>,
    incoming: EmailStatus,
) -> DomainResult<StatusChange> {
    for rung in PRIORITY_LADDER {
        if rung == incoming {
            return Ok(if current == Some(incoming) {
                StatusChange::Keep
            } else {
                StatusChange::Apply(incoming)
            });
        }
        if current == Some(rung) {
            return Ok(StatusChange::Keep);
        }
    }

    Err(DomainError::unranked_status(incoming.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(current: Option<EmailStatus>, incoming: EmailStatus) -> Option<EmailStatus> {
        match next_status(current, incoming).unwrap() {
            StatusChange::Apply(s) => Some(s),
            StatusChange::Keep => current,
        }
    }

    #[test]
    fn delivered_open_processed_sequence() {
        let mut status = Some(EmailStatus::Processed);
        status = apply(status, EmailStatus::Delivered);
        assert_eq!(status, Some(EmailStatus::Delivered));
        status = apply(status, EmailStatus::Open);
        assert_eq!(status, Some(EmailStatus::Open));
        status = apply(status, EmailStatus::Processed);
        assert_eq!(status, Some(EmailStatus::Open));
    }

    #[test]
    fn open_is_not_displaced_by_delivered() {
        let mut status = None;
        for incoming in [EmailStatus::Open, EmailStatus::Delivered, EmailStatus::Open] {
            status = apply(status, incoming);
        }
        assert_eq!(status, Some(EmailStatus::Open));
    }

    #[test]
    fn repeating_current_status_is_keep() {
        assert_eq!(
            next_status(Some(EmailStatus::Click), EmailStatus::Click).unwrap(),
            StatusChange::Keep
        );
    }

    #[test]
    fn unset_accepts_any_ranked_status() {
        for status in PRIORITY_LADDER {
            assert_eq!(apply(None, status), Some(status));
        }
    }

    #[test]
    fn off_ladder_statuses_are_rejected_on_unset_email() {
        for status in [EmailStatus::Bounce, EmailStatus::Blocked] {
            let err = next_status(None, status).unwrap_err();
            assert_eq!(err, DomainError::unranked_status(status.as_str()));
        }
    }

    #[test]
    fn off_ladder_statuses_never_displace_a_ranked_status() {
        for current in PRIORITY_LADDER {
            for status in [EmailStatus::Bounce, EmailStatus::Blocked] {
                assert_eq!(next_status(Some(current), status).unwrap(), StatusChange::Keep);
            }
        }
    }

    #[test]
    fn parse_accepts_wire_names_and_rejects_unknown() {
        for status in EmailStatus::ALL {
            assert_eq!(status.as_str().parse::<EmailStatus>().unwrap(), status);
        }
        assert_eq!(
            "group-unsubscribe".parse::<EmailStatus>().unwrap(),
            EmailStatus::GroupUnsubscribe
        );
        assert_eq!(
            "Delivered".parse::<EmailStatus>().unwrap(),
            EmailStatus::Delivered
        );
        assert!(matches!(
            "teleported".parse::<EmailStatus>(),
            Err(DomainError::UnknownStatus(s)) if s == "teleported"
        ));
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&EmailStatus::GroupUnsubscribe).unwrap();
        assert_eq!(json, "\"group_unsubscribe\"");
        let json = serde_json::to_string(&EmailStatus::SpamReport).unwrap();
        assert_eq!(json, "\"spamreport\"");
    }

    #[test]
    fn flag_mapping() {
        assert_eq!(EmailStatus::Processed.recipient_flag(), None);
        assert_eq!(
            EmailStatus::GroupUnsubscribe.recipient_flag(),
            Some(RecipientFlag::Unsubscribe)
        );
        assert_eq!(
            EmailStatus::SpamReport.recipient_flag(),
            Some(RecipientFlag::Spam)
        );
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn ranked() -> impl Strategy<Value = EmailStatus> {
            proptest::sample::select(PRIORITY_LADDER.to_vec())
        }

        proptest! {
            /// Property: once spamreport is recorded nothing displaces it.
            #[test]
            fn spamreport_is_terminal(rest in proptest::collection::vec(ranked(), 0..20)) {
                let mut status = apply(None, EmailStatus::SpamReport);
                for incoming in rest {
                    status = apply(status, incoming);
                }
                prop_assert_eq!(status, Some(EmailStatus::SpamReport));
            }

            /// Property: the recorded status never moves down the ladder.
            #[test]
            fn rank_never_regresses(seq in proptest::collection::vec(ranked(), 1..30)) {
                let mut status: Option<EmailStatus> = None;
                for incoming in seq {
                    let before = status.and_then(EmailStatus::rank);
                    status = apply(status, incoming);
                    let after = status.and_then(EmailStatus::rank);
                    if let (Some(before), Some(after)) = (before, after) {
                        prop_assert!(after <= before);
                    }
                }
            }

            /// Property: applying the same status twice equals applying it once.
            #[test]
            fn application_is_idempotent(current in proptest::option::of(ranked()), incoming in ranked()) {
                let once = apply(current, incoming);
                let twice = apply(once, incoming);
                prop_assert_eq!(once, twice);
            }
        }
    }
}
