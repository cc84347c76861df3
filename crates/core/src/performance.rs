//! Send-cadence estimation from recent delivery history.

use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::status::EmailStatus;

/// Maximum number of aggregate rows the estimator looks at.
pub const SAMPLE_LIMIT: usize = 150;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);

/// Count of sent emails for one (day, status) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub day: NaiveDate,
    /// `None` for emails sent but not yet reported on.
    pub status: Option<EmailStatus>,
    pub count: i64,
}

impl PerformanceSample {
    pub fn new(day: NaiveDate, status: Option<EmailStatus>, count: i64) -> Self {
        Self { day, status, count }
    }
}

/// Delay to leave between consecutive sends of one identity.
///
/// `samples` must be ordered newest day first. Young identities are held to a
/// slow ramp; established ones are paced by their bad-to-sent ratio and their
/// absolute delivered volume. Bands are checked in order and the first match
/// wins.
pub fn recommended_delay(samples: &[PerformanceSample]) -> Duration {
    let (Some(newest), Some(oldest)) = (samples.first(), samples.last()) else {
        return HOUR;
    };
    if samples.len() < 2 {
        return HOUR;
    }

    let days = (newest.day - oldest.day).num_days();
    if days < 5 {
        return 40 * MINUTE;
    }
    if days < 11 {
        return 30 * MINUTE;
    }

    let (mut sends, mut good, mut bads) = (0i64, 0i64, 0i64);
    for sample in samples {
        match sample.status {
            None | Some(EmailStatus::Processed) => sends += sample.count,
            Some(EmailStatus::Delivered) => good += sample.count,
            Some(_) => bads += sample.count,
        }
    }

    if sends < 1 {
        return HOUR;
    }

    let ratio = bads as f64 / sends as f64;
    if ratio > 0.15 || good < 60 {
        15 * MINUTE
    } else if ratio > 0.10 || good < 100 {
        12 * MINUTE
    } else if ratio > 0.50 || good < 200 {
        6 * MINUTE
    } else if ratio > 0.02 || good < 400 {
        3 * MINUTE
    } else if ratio > 0.01 {
        2 * MINUTE
    } else {
        MINUTE
    }
}
