//! Storage for account-opening requests, member balances and activity logs.
//!
//! Every ledger operation runs inside one [`LedgerTx`]. Rows fetched through
//! a transaction stay locked until it commits or is dropped, and dropping a
//! transaction without committing discards all of its writes.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::types::{
    AccountOpening, AccountStatus, ActivityKind, NewAccountOpening, NewActivity, UserActivity,
    UserRecord,
};

pub use memory::{FailPoint, MemoryStore};
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("transaction already finished")]
    Finished,
    #[error("injected failure at {0:?}")]
    Injected(FailPoint),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Opens a transaction.
    async fn begin(&self) -> Result<Box<dyn LedgerTx>>;

    /// Returns one page of requests, newest first, and the total count.
    async fn list_accounts(&self, limit: i64, offset: i64) -> Result<(Vec<AccountOpening>, i64)>;

    async fn user(&self, user_id: i64) -> Result<Option<UserRecord>>;

    /// Returns a member's activity log, newest first.
    async fn activities(&self, user_id: i64) -> Result<Vec<UserActivity>>;
}

#[async_trait]
pub trait LedgerTx: Send {
    async fn account_for_update(&mut self, id: i64) -> Result<Option<AccountOpening>>;

    async fn insert_account(&mut self, new: &NewAccountOpening) -> Result<AccountOpening>;

    async fn set_account_owner(&mut self, id: i64, user_id: i64) -> Result<()>;

    /// Stores the new status and transition delta and returns the updated row.
    async fn update_account_state(
        &mut self,
        id: i64,
        status: AccountStatus,
        points: i64,
    ) -> Result<AccountOpening>;

    async fn delete_account(&mut self, id: i64) -> Result<bool>;

    async fn user_for_update(&mut self, id: i64) -> Result<Option<UserRecord>>;

    /// First user (lowest id) with exactly this name.
    async fn user_by_name(&mut self, name: &str) -> Result<Option<UserRecord>>;

    async fn user_by_referral_code(&mut self, code: &str) -> Result<Option<UserRecord>>;

    /// Writes `points`, `actions_completed` and `referral_count`.
    async fn update_user_counters(&mut self, user: &UserRecord) -> Result<()>;

    async fn insert_activity(&mut self, activity: &NewActivity) -> Result<()>;

    /// Removes the entry the given account caused for the given user.
    async fn delete_activity(
        &mut self,
        user_id: i64,
        account_id: i64,
        kind: ActivityKind,
    ) -> Result<u64>;

    async fn commit(&mut self) -> Result<()>;
}
