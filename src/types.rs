use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Approval state of an account-opening request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Pending,
    Approved,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Pending => "Pending",
            AccountStatus::Approved => "Approved",
        }
    }

    /// The status a toggle moves to.
    pub fn toggled(self) -> Self {
        match self {
            AccountStatus::Pending => AccountStatus::Approved,
            AccountStatus::Approved => AccountStatus::Pending,
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value {value:?}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl FromStr for AccountStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(AccountStatus::Pending),
            "Approved" => Ok(AccountStatus::Approved),
            other => Err(ParseEnumError {
                kind: "account status",
                value: other.to_string(),
            }),
        }
    }
}

/// What caused an activity-log entry. Together with the account id it
/// identifies the entry to remove when the effect is reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    AccountOpening,
    ReferralBonus,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::AccountOpening => "account_opening",
            ActivityKind::ReferralBonus => "referral_bonus",
        }
    }
}

impl FromStr for ActivityKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "account_opening" => Ok(ActivityKind::AccountOpening),
            "referral_bonus" => Ok(ActivityKind::ReferralBonus),
            other => Err(ParseEnumError {
                kind: "activity kind",
                value: other.to_string(),
            }),
        }
    }
}

/// A request to open a financial account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountOpening {
    /// The ID of the request.
    pub id: i64,
    /// The customer's name.
    pub name: String,
    /// The kind of account requested, e.g. `fixed-deposit`.
    pub account_type: String,
    /// The approval status.
    pub status: AccountStatus,
    /// The signed point delta applied by the last transition.
    pub points: i64,
    /// The owning member. Only legacy rows lack one.
    pub user_id: Option<i64>,
    /// The referral code of the member who referred the customer.
    pub referral_code: Option<String>,
    /// The timestamp when the request was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp of the last change.
    pub updated_at: DateTime<Utc>,
}

/// The fields supplied when a new account-opening request is filed.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccountOpening {
    pub name: String,
    pub account_type: String,
    pub user_id: i64,
    pub referral_code: Option<String>,
}

/// A member's balance and counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct UserRecord {
    /// The ID of the user.
    pub id: i64,
    /// The member's display name.
    pub name: String,
    /// The code this member hands out to the people they refer.
    pub referral_code: Option<String>,
    /// Running point total.
    pub points: i64,
    pub actions_completed: i64,
    pub referral_count: i64,
}

/// An audit row describing a point-earning event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserActivity {
    pub id: i64,
    pub user_id: i64,
    pub account_id: Option<i64>,
    pub event_kind: ActivityKind,
    pub points: i64,
    /// Human-readable description shown in the member's feed.
    pub activity_type: String,
    pub platform_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
    pub user_id: i64,
    pub account_id: i64,
    pub event_kind: ActivityKind,
    pub points: i64,
    pub activity_type: String,
    pub platform_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_toggles_both_ways() {
        assert_eq!(AccountStatus::Pending.toggled(), AccountStatus::Approved);
        assert_eq!(AccountStatus::Approved.toggled(), AccountStatus::Pending);
    }

    #[test]
    fn status_parses_stored_text() {
        assert_eq!(
            "Approved".parse::<AccountStatus>().unwrap(),
            AccountStatus::Approved
        );
        let err = "approved".parse::<AccountStatus>().unwrap_err();
        assert_eq!(err.to_string(), r#"unknown account status value "approved""#);
    }

    #[test]
    fn activity_kind_matches_column_text() {
        for kind in [ActivityKind::AccountOpening, ActivityKind::ReferralBonus] {
            assert_eq!(kind.as_str().parse::<ActivityKind>().unwrap(), kind);
        }
        assert_eq!(
            serde_json::to_string(&ActivityKind::ReferralBonus).unwrap(),
            r#""referral_bonus""#
        );
    }
}
