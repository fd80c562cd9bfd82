//! The points ledger.
//!
//! Approving an account-opening request credits its owner and, when the
//! request carries a referral code, the referrer. Reverting or deleting the
//! request takes those points back. Each operation runs in one store
//! transaction, so a failure at any step leaves every table unchanged.

mod notify;
pub mod rules;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

pub use notify::{Notifier, NotifyLevel, TracingNotifier};
pub use rules::PointRules;

use crate::store::{self, LedgerStore, LedgerTx, StoreError};
use crate::types::{
    AccountOpening, AccountStatus, ActivityKind, NewAccountOpening, NewActivity, UserActivity,
    UserRecord,
};

/// The step a store failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Begin,
    FetchAccount,
    RepairOwner,
    FetchUser,
    UpdateUser,
    InsertActivity,
    DeleteActivity,
    FetchReferrer,
    UpdateReferrer,
    UpdateAccount,
    DeleteAccount,
    CreateAccount,
    Commit,
    LoadView,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Begin => "starting the update",
            Step::FetchAccount => "fetching customer data",
            Step::RepairOwner => "linking the customer to a user",
            Step::FetchUser => "fetching user data",
            Step::UpdateUser => "updating user data",
            Step::InsertActivity => "logging the activity",
            Step::DeleteActivity => "removing the activity log",
            Step::FetchReferrer => "fetching referrer data",
            Step::UpdateReferrer => "updating referrer data",
            Step::UpdateAccount => "updating customer status",
            Step::DeleteAccount => "deleting the customer",
            Step::CreateAccount => "creating the account request",
            Step::Commit => "saving changes",
            Step::LoadView => "loading data",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("account {0} not found")]
    AccountNotFound(i64),
    #[error("user {0} not found")]
    UserNotFound(i64),
    #[error("no user named {name:?} to own the account")]
    OwnerUnresolved { name: String },
    #[error("account is {actual}, expected {expected}")]
    StatusConflict {
        expected: AccountStatus,
        actual: AccountStatus,
    },
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("error {step}: {source}")]
    Store {
        step: Step,
        #[source]
        source: StoreError,
    },
}

impl LedgerError {
    /// The text shown to the person who triggered the operation.
    pub fn user_message(&self) -> String {
        match self {
            LedgerError::AccountNotFound(_) => "Customer not found.".to_string(),
            LedgerError::UserNotFound(_) => "User not found.".to_string(),
            LedgerError::OwnerUnresolved { name } => {
                format!("No user named {name} could be linked to this customer.")
            }
            LedgerError::StatusConflict { actual, .. } => {
                format!("Customer is already {actual}. Refresh and try again.")
            }
            LedgerError::Validation(msg) => msg.clone(),
            LedgerError::Store { step, .. } => format!("Error {step}."),
        }
    }
}

trait AtStep<T> {
    fn at(self, step: Step) -> Result<T, LedgerError>;
}

impl<T> AtStep<T> for store::Result<T> {
    fn at(self, step: Step) -> Result<T, LedgerError> {
        self.map_err(|source| LedgerError::Store { step, source })
    }
}

/// Result of a status toggle.
#[derive(Debug, Clone, Serialize)]
pub struct ToggleOutcome {
    /// The request after the toggle.
    pub account: AccountOpening,
    /// Signed delta applied to the owner.
    pub points_change: i64,
    pub owner: UserRecord,
    pub referrer: Option<UserRecord>,
}

/// Result of a deletion. Balances are only present when they changed.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    /// The request as it was before deletion.
    pub account: AccountOpening,
    pub owner: Option<UserRecord>,
    pub referrer: Option<UserRecord>,
}

pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn Notifier>,
    rules: PointRules,
    platform_url: String,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            rules: PointRules::default(),
            platform_url: String::new(),
        }
    }

    pub fn with_rules(mut self, rules: PointRules) -> Self {
        self.rules = rules;
        self
    }

    /// URL recorded on every activity-log entry.
    pub fn with_platform_url(mut self, url: impl Into<String>) -> Self {
        self.platform_url = url.into();
        self
    }

    pub fn rules(&self) -> PointRules {
        self.rules
    }

    /// Flips a request between `Pending` and `Approved`.
    ///
    /// When `expected` is given and the stored status differs, nothing is
    /// written and [`LedgerError::StatusConflict`] is returned. Callers that
    /// may submit twice pass the status they saw.
    pub async fn toggle_status(
        &self,
        account_id: i64,
        expected: Option<AccountStatus>,
    ) -> Result<ToggleOutcome, LedgerError> {
        let result = self.run_toggle(account_id, expected).await;
        match &result {
            Ok(outcome) => {
                info!(
                    account_id,
                    status = %outcome.account.status,
                    points_change = outcome.points_change,
                    owner_id = outcome.owner.id,
                    referrer_id = outcome.referrer.as_ref().map(|r| r.id),
                    "account status toggled"
                );
                self.notifier
                    .notify(&self.toggle_message(outcome), NotifyLevel::Success);
                self.notifier.refetch_customers();
            }
            Err(e) => self.report("toggle", Some(account_id), e),
        }
        result
    }

    /// Deletes a request and reverses the points it awarded.
    pub async fn delete_account(&self, account_id: i64) -> Result<DeleteOutcome, LedgerError> {
        let result = self.run_delete(account_id).await;
        match &result {
            Ok(outcome) => {
                info!(
                    account_id,
                    owner_id = outcome.owner.as_ref().map(|o| o.id),
                    referrer_id = outcome.referrer.as_ref().map(|r| r.id),
                    "account deleted"
                );
                self.notifier.notify(
                    &format!("Customer {} deleted successfully.", outcome.account.name),
                    NotifyLevel::Success,
                );
                self.notifier.refetch_customers();
            }
            Err(e) => self.report("delete", Some(account_id), e),
        }
        result
    }

    /// Files a new `Pending` request for an existing member.
    pub async fn open_account(
        &self,
        new: NewAccountOpening,
    ) -> Result<AccountOpening, LedgerError> {
        let result = self.run_open(new).await;
        match &result {
            Ok(account) => {
                info!(account_id = account.id, user_id = ?account.user_id, "account request created");
                self.notifier.notify(
                    &format!("Account opening request for {} submitted.", account.name),
                    NotifyLevel::Info,
                );
                self.notifier.refetch_customers();
            }
            Err(e) => self.report("open", None, e),
        }
        result
    }

    /// One page of requests, newest first, and the total number of requests.
    pub async fn list_accounts(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<AccountOpening>, i64), LedgerError> {
        self.store
            .list_accounts(limit, offset)
            .await
            .at(Step::LoadView)
    }

    pub async fn user(&self, user_id: i64) -> Result<UserRecord, LedgerError> {
        self.store
            .user(user_id)
            .await
            .at(Step::LoadView)?
            .ok_or(LedgerError::UserNotFound(user_id))
    }

    pub async fn activities(&self, user_id: i64) -> Result<Vec<UserActivity>, LedgerError> {
        self.user(user_id).await?;
        self.store.activities(user_id).await.at(Step::LoadView)
    }

    async fn run_toggle(
        &self,
        account_id: i64,
        expected: Option<AccountStatus>,
    ) -> Result<ToggleOutcome, LedgerError> {
        let mut tx = self.store.begin().await.at(Step::Begin)?;
        let account = fetch_account(&mut *tx, account_id).await?;

        if let Some(expected) = expected {
            if expected != account.status {
                return Err(LedgerError::StatusConflict {
                    expected,
                    actual: account.status,
                });
            }
        }

        let owner_id = match account.user_id {
            Some(id) => id,
            None => repair_owner(&mut *tx, &account).await?,
        };

        let new_status = account.status.toggled();
        let points_change = self.rules.points_change(new_status);

        let mut owner = tx
            .user_for_update(owner_id)
            .await
            .at(Step::FetchUser)?
            .ok_or(LedgerError::UserNotFound(owner_id))?;
        self.rules.apply_owner_transition(&mut owner, new_status);
        tx.update_user_counters(&owner).await.at(Step::UpdateUser)?;

        match new_status {
            AccountStatus::Approved => {
                let activity = NewActivity {
                    user_id: owner.id,
                    account_id,
                    event_kind: ActivityKind::AccountOpening,
                    points: self.rules.approval_points,
                    activity_type: rules::account_opening_description(&account.account_type),
                    platform_url: self.platform_url.clone(),
                };
                tx.insert_activity(&activity)
                    .await
                    .at(Step::InsertActivity)?;
            }
            AccountStatus::Pending => {
                tx.delete_activity(owner.id, account_id, ActivityKind::AccountOpening)
                    .await
                    .at(Step::DeleteActivity)?;
            }
        }

        let referrer = match account.referral_code.as_deref() {
            Some(code) => {
                self.toggle_referrer(&mut *tx, &account, code, new_status)
                    .await?
            }
            None => None,
        };
        if let Some(referrer) = referrer.as_ref().filter(|r| r.id == owner.id) {
            owner = referrer.clone();
        }

        let account = tx
            .update_account_state(account_id, new_status, points_change)
            .await
            .at(Step::UpdateAccount)?;
        tx.commit().await.at(Step::Commit)?;

        Ok(ToggleOutcome {
            account,
            points_change,
            owner,
            referrer,
        })
    }

    async fn toggle_referrer(
        &self,
        tx: &mut dyn LedgerTx,
        account: &AccountOpening,
        code: &str,
        new_status: AccountStatus,
    ) -> Result<Option<UserRecord>, LedgerError> {
        let Some(mut referrer) = tx
            .user_by_referral_code(code)
            .await
            .at(Step::FetchReferrer)?
        else {
            warn!(
                account_id = account.id,
                referral_code = code,
                "referral code matches no user, skipping referral bonus"
            );
            return Ok(None);
        };

        self.rules.apply_referrer_transition(&mut referrer, new_status);
        tx.update_user_counters(&referrer)
            .await
            .at(Step::UpdateReferrer)?;

        match new_status {
            AccountStatus::Approved => {
                let activity = NewActivity {
                    user_id: referrer.id,
                    account_id: account.id,
                    event_kind: ActivityKind::ReferralBonus,
                    points: self.rules.referral_points,
                    activity_type: rules::referral_bonus_description(
                        &account.name,
                        &account.account_type,
                    ),
                    platform_url: self.platform_url.clone(),
                };
                tx.insert_activity(&activity)
                    .await
                    .at(Step::InsertActivity)?;
            }
            AccountStatus::Pending => {
                tx.delete_activity(referrer.id, account.id, ActivityKind::ReferralBonus)
                    .await
                    .at(Step::DeleteActivity)?;
            }
        }

        Ok(Some(referrer))
    }

    async fn run_delete(&self, account_id: i64) -> Result<DeleteOutcome, LedgerError> {
        let mut tx = self.store.begin().await.at(Step::Begin)?;
        let account = fetch_account(&mut *tx, account_id).await?;

        let mut owner = None;
        let mut referrer = None;

        // Pending requests have no points in force.
        if account.status == AccountStatus::Approved {
            match account.user_id {
                Some(owner_id) => {
                    let mut user = tx
                        .user_for_update(owner_id)
                        .await
                        .at(Step::FetchUser)?
                        .ok_or(LedgerError::UserNotFound(owner_id))?;
                    self.rules.reverse_owner_on_delete(&mut user, account.points);
                    tx.update_user_counters(&user).await.at(Step::UpdateUser)?;
                    tx.delete_activity(user.id, account.id, ActivityKind::AccountOpening)
                        .await
                        .at(Step::DeleteActivity)?;
                    owner = Some(user);
                }
                None => warn!(account_id, "approved account has no owner, nothing to reverse"),
            }

            if let Some(code) = account.referral_code.as_deref() {
                match tx
                    .user_by_referral_code(code)
                    .await
                    .at(Step::FetchReferrer)?
                {
                    Some(mut user) => {
                        self.rules.reverse_referrer_on_delete(&mut user);
                        tx.update_user_counters(&user)
                            .await
                            .at(Step::UpdateReferrer)?;
                        tx.delete_activity(user.id, account.id, ActivityKind::ReferralBonus)
                            .await
                            .at(Step::DeleteActivity)?;
                        referrer = Some(user);
                    }
                    None => warn!(
                        account_id,
                        referral_code = code,
                        "referral code matches no user, skipping referral reversal"
                    ),
                }
            }
        }

        if !tx
            .delete_account(account.id)
            .await
            .at(Step::DeleteAccount)?
        {
            return Err(LedgerError::AccountNotFound(account.id));
        }
        tx.commit().await.at(Step::Commit)?;

        Ok(DeleteOutcome {
            account,
            owner,
            referrer,
        })
    }

    async fn run_open(&self, mut new: NewAccountOpening) -> Result<AccountOpening, LedgerError> {
        new.name = new.name.trim().to_string();
        new.account_type = new.account_type.trim().to_string();
        new.referral_code = new
            .referral_code
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        if new.name.is_empty() {
            return Err(LedgerError::Validation("name must not be empty".into()));
        }
        if new.account_type.is_empty() {
            return Err(LedgerError::Validation(
                "account_type must not be empty".into(),
            ));
        }

        let mut tx = self.store.begin().await.at(Step::Begin)?;
        tx.user_for_update(new.user_id)
            .await
            .at(Step::FetchUser)?
            .ok_or(LedgerError::UserNotFound(new.user_id))?;
        if let Some(code) = new.referral_code.as_deref() {
            if tx
                .user_by_referral_code(code)
                .await
                .at(Step::FetchReferrer)?
                .is_none()
            {
                return Err(LedgerError::Validation(format!(
                    "unknown referral code {code}"
                )));
            }
        }

        let account = tx
            .insert_account(&new)
            .await
            .at(Step::CreateAccount)?;
        tx.commit().await.at(Step::Commit)?;
        Ok(account)
    }

    fn toggle_message(&self, outcome: &ToggleOutcome) -> String {
        let (verb, bonus_verb) = if outcome.points_change >= 0 {
            ("assigned to", "assigned to referrer")
        } else {
            ("removed from", "removed from referrer")
        };
        let mut message = format!(
            "{} points {verb} {}.",
            outcome.points_change.abs(),
            outcome.account.name
        );
        if let Some(referrer) = &outcome.referrer {
            message.push_str(&format!(
                " {} referral points {bonus_verb} {}.",
                self.rules.referral_points, referrer.name
            ));
        }
        message
    }

    fn report(&self, op: &str, account_id: Option<i64>, err: &LedgerError) {
        match err {
            LedgerError::Store { .. } => {
                error!(op, account_id, error = %err, "ledger operation failed")
            }
            _ => warn!(op, account_id, error = %err, "ledger operation rejected"),
        }
        self.notifier.notify(&err.user_message(), NotifyLevel::Error);
    }
}

async fn fetch_account(
    tx: &mut dyn LedgerTx,
    account_id: i64,
) -> Result<AccountOpening, LedgerError> {
    tx.account_for_update(account_id)
        .await
        .at(Step::FetchAccount)?
        .ok_or(LedgerError::AccountNotFound(account_id))
}

/// Links a legacy request without an owner to the user with its name.
async fn repair_owner(
    tx: &mut dyn LedgerTx,
    account: &AccountOpening,
) -> Result<i64, LedgerError> {
    let user = tx
        .user_by_name(&account.name)
        .await
        .at(Step::RepairOwner)?
        .ok_or_else(|| LedgerError::OwnerUnresolved {
            name: account.name.clone(),
        })?;
    tx.set_account_owner(account.id, user.id)
        .await
        .at(Step::RepairOwner)?;
    warn!(
        account_id = account.id,
        user_id = user.id,
        "account had no owner, linked by name"
    );
    Ok(user.id)
}
