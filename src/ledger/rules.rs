//! Point arithmetic for status transitions and deletions.
//!
//! Owner balances are never clamped. Counters are clamped at zero, as are
//! referrer balances when a toggle reverts an approval. Deletion does not
//! clamp referrer balances.

use crate::types::{AccountStatus, UserRecord};

pub const DEFAULT_APPROVAL_POINTS: i64 = 200;
pub const DEFAULT_REFERRAL_POINTS: i64 = 50;

/// Point amounts awarded by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointRules {
    /// Credited to the owner when a request is approved.
    pub approval_points: i64,
    /// Credited to the referrer when a referred request is approved.
    pub referral_points: i64,
}

impl Default for PointRules {
    fn default() -> Self {
        Self {
            approval_points: DEFAULT_APPROVAL_POINTS,
            referral_points: DEFAULT_REFERRAL_POINTS,
        }
    }
}

impl PointRules {
    /// Signed owner delta for a transition into `new_status`.
    pub fn points_change(&self, new_status: AccountStatus) -> i64 {
        match new_status {
            AccountStatus::Approved => self.approval_points,
            AccountStatus::Pending => -self.approval_points,
        }
    }

    pub fn apply_owner_transition(&self, owner: &mut UserRecord, new_status: AccountStatus) {
        owner.points += self.points_change(new_status);
        owner.actions_completed = match new_status {
            AccountStatus::Approved => owner.actions_completed + 1,
            AccountStatus::Pending => (owner.actions_completed - 1).max(0),
        };
    }

    pub fn apply_referrer_transition(&self, referrer: &mut UserRecord, new_status: AccountStatus) {
        match new_status {
            AccountStatus::Approved => {
                referrer.points += self.referral_points;
                referrer.referral_count += 1;
                referrer.actions_completed += 1;
            }
            AccountStatus::Pending => {
                referrer.points = (referrer.points - self.referral_points).max(0);
                referrer.referral_count = (referrer.referral_count - 1).max(0);
                referrer.actions_completed = (referrer.actions_completed - 1).max(0);
            }
        }
    }

    /// Reverses an approved request's effect on its owner. `stored_points`
    /// is the delta recorded on the request.
    pub fn reverse_owner_on_delete(&self, owner: &mut UserRecord, stored_points: i64) {
        owner.points -= stored_points;
        owner.actions_completed = (owner.actions_completed - 1).max(0);
    }

    pub fn reverse_referrer_on_delete(&self, referrer: &mut UserRecord) {
        referrer.points -= self.referral_points;
        referrer.referral_count = (referrer.referral_count - 1).max(0);
        referrer.actions_completed = (referrer.actions_completed - 1).max(0);
    }
}

pub fn account_opening_description(account_type: &str) -> String {
    format!("Opened a {account_type} account")
}

pub fn referral_bonus_description(customer_name: &str, account_type: &str) -> String {
    format!("Referral bonus: {customer_name} opened a {account_type} account")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(points: i64, actions: i64, referrals: i64) -> UserRecord {
        UserRecord {
            id: 1,
            name: "Ada".into(),
            referral_code: None,
            points,
            actions_completed: actions,
            referral_count: referrals,
        }
    }

    #[test]
    fn approve_then_revert_restores_owner_points() {
        let rules = PointRules::default();
        let mut owner = user(500, 2, 0);
        rules.apply_owner_transition(&mut owner, AccountStatus::Approved);
        assert_eq!((owner.points, owner.actions_completed), (700, 3));
        rules.apply_owner_transition(&mut owner, AccountStatus::Pending);
        assert_eq!((owner.points, owner.actions_completed), (500, 2));
    }

    #[test]
    fn owner_revert_does_not_clamp_points() {
        let rules = PointRules::default();
        let mut owner = user(50, 0, 0);
        rules.apply_owner_transition(&mut owner, AccountStatus::Pending);
        assert_eq!(owner.points, -150);
        assert_eq!(owner.actions_completed, 0);
    }

    #[test]
    fn referrer_revert_clamps_at_zero() {
        let rules = PointRules::default();
        let mut referrer = user(20, 0, 0);
        rules.apply_referrer_transition(&mut referrer, AccountStatus::Pending);
        assert_eq!(referrer, user(0, 0, 0));
    }

    #[test]
    fn referrer_moves_in_lockstep() {
        let rules = PointRules::default();
        let mut referrer = user(0, 4, 0);
        rules.apply_referrer_transition(&mut referrer, AccountStatus::Approved);
        assert_eq!(referrer, user(50, 5, 1));
        rules.apply_referrer_transition(&mut referrer, AccountStatus::Pending);
        assert_eq!(referrer, user(0, 4, 0));
    }

    #[test]
    fn deletion_reversal_can_go_negative() {
        let rules = PointRules::default();
        let mut owner = user(100, 0, 0);
        rules.reverse_owner_on_delete(&mut owner, 200);
        assert_eq!(owner, user(-100, 0, 0));

        let mut referrer = user(10, 1, 1);
        rules.reverse_referrer_on_delete(&mut referrer);
        assert_eq!(referrer, user(-40, 0, 0));
    }

    #[test]
    fn custom_amounts_are_used() {
        let rules = PointRules {
            approval_points: 75,
            referral_points: 5,
        };
        assert_eq!(rules.points_change(AccountStatus::Approved), 75);
        assert_eq!(rules.points_change(AccountStatus::Pending), -75);
        let mut referrer = user(0, 0, 0);
        rules.apply_referrer_transition(&mut referrer, AccountStatus::Approved);
        assert_eq!(referrer.points, 5);
    }

    #[test]
    fn descriptions_embed_account_details() {
        assert_eq!(
            account_opening_description("fixed-deposit"),
            "Opened a fixed-deposit account"
        );
        assert_eq!(
            referral_bonus_description("Grace", "savings"),
            "Referral bonus: Grace opened a savings account"
        );
    }
}
