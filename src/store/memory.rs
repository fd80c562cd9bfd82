//! In-memory store used by tests and local demos.
//!
//! Transactions take an owned lock on the tables for their whole lifetime
//! and work on a copy that replaces the tables on commit.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::{LedgerStore, LedgerTx, Result, StoreError};
use crate::types::{
    AccountOpening, AccountStatus, ActivityKind, NewAccountOpening, NewActivity, UserActivity,
    UserRecord,
};

/// Operations that can be made to fail for tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    FetchAccount,
    InsertAccount,
    SetOwner,
    UpdateAccount,
    DeleteAccount,
    FetchUser,
    FindUserByName,
    FindReferrer,
    UpdateUser,
    InsertActivity,
    DeleteActivity,
    Commit,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    accounts: BTreeMap<i64, AccountOpening>,
    users: BTreeMap<i64, UserRecord>,
    activities: Vec<UserActivity>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    fail_on: RwLock<Option<FailPoint>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on(&self, point: Option<FailPoint>) {
        *self.fail_on.write().await = point;
    }

    pub async fn seed_user(&self, user: UserRecord) {
        self.tables.lock().await.users.insert(user.id, user);
    }

    /// Inserts a request as-is, including legacy rows without an owner.
    pub async fn seed_account(&self, account: AccountOpening) {
        self.tables.lock().await.accounts.insert(account.id, account);
    }

    pub async fn account(&self, id: i64) -> Option<AccountOpening> {
        self.tables.lock().await.accounts.get(&id).cloned()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>> {
        let fail_on = *self.fail_on.read().await;
        let guard = self.tables.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx {
            guard: Some(guard),
            work,
            fail_on,
        }))
    }

    async fn list_accounts(&self, limit: i64, offset: i64) -> Result<(Vec<AccountOpening>, i64)> {
        let tables = self.tables.lock().await;
        let mut accounts: Vec<_> = tables.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = accounts.len() as i64;
        let page = accounts
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn user(&self, user_id: i64) -> Result<Option<UserRecord>> {
        Ok(self.tables.lock().await.users.get(&user_id).cloned())
    }

    async fn activities(&self, user_id: i64) -> Result<Vec<UserActivity>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<_> = tables
            .activities
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }
}

pub struct MemoryTx {
    guard: Option<OwnedMutexGuard<Tables>>,
    work: Tables,
    fail_on: Option<FailPoint>,
}

impl MemoryTx {
    fn check(&self, point: FailPoint) -> Result<()> {
        if self.guard.is_none() {
            return Err(StoreError::Finished);
        }
        if self.fail_on == Some(point) {
            return Err(StoreError::Injected(point));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn account_for_update(&mut self, id: i64) -> Result<Option<AccountOpening>> {
        self.check(FailPoint::FetchAccount)?;
        Ok(self.work.accounts.get(&id).cloned())
    }

    async fn insert_account(&mut self, new: &NewAccountOpening) -> Result<AccountOpening> {
        self.check(FailPoint::InsertAccount)?;
        let id = self.work.accounts.keys().next_back().map_or(1, |last| last + 1);
        let now = Utc::now();
        let account = AccountOpening {
            id,
            name: new.name.clone(),
            account_type: new.account_type.clone(),
            status: AccountStatus::Pending,
            points: 0,
            user_id: Some(new.user_id),
            referral_code: new.referral_code.clone(),
            created_at: now,
            updated_at: now,
        };
        self.work.accounts.insert(id, account.clone());
        Ok(account)
    }

    async fn set_account_owner(&mut self, id: i64, user_id: i64) -> Result<()> {
        self.check(FailPoint::SetOwner)?;
        if let Some(account) = self.work.accounts.get_mut(&id) {
            account.user_id = Some(user_id);
            account.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn update_account_state(
        &mut self,
        id: i64,
        status: AccountStatus,
        points: i64,
    ) -> Result<AccountOpening> {
        self.check(FailPoint::UpdateAccount)?;
        let account = self
            .work
            .accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::Corrupt(format!("account {id} vanished mid-transaction")))?;
        account.status = status;
        account.points = points;
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    async fn delete_account(&mut self, id: i64) -> Result<bool> {
        self.check(FailPoint::DeleteAccount)?;
        Ok(self.work.accounts.remove(&id).is_some())
    }

    async fn user_for_update(&mut self, id: i64) -> Result<Option<UserRecord>> {
        self.check(FailPoint::FetchUser)?;
        Ok(self.work.users.get(&id).cloned())
    }

    async fn user_by_name(&mut self, name: &str) -> Result<Option<UserRecord>> {
        self.check(FailPoint::FindUserByName)?;
        Ok(self.work.users.values().find(|u| u.name == name).cloned())
    }

    async fn user_by_referral_code(&mut self, code: &str) -> Result<Option<UserRecord>> {
        self.check(FailPoint::FindReferrer)?;
        Ok(self
            .work
            .users
            .values()
            .find(|u| u.referral_code.as_deref() == Some(code))
            .cloned())
    }

    async fn update_user_counters(&mut self, user: &UserRecord) -> Result<()> {
        self.check(FailPoint::UpdateUser)?;
        if let Some(row) = self.work.users.get_mut(&user.id) {
            row.points = user.points;
            row.actions_completed = user.actions_completed;
            row.referral_count = user.referral_count;
        }
        Ok(())
    }

    async fn insert_activity(&mut self, activity: &NewActivity) -> Result<()> {
        self.check(FailPoint::InsertActivity)?;
        let id = self.work.activities.iter().map(|a| a.id).max().unwrap_or(0) + 1;
        self.work.activities.push(UserActivity {
            id,
            user_id: activity.user_id,
            account_id: Some(activity.account_id),
            event_kind: activity.event_kind,
            points: activity.points,
            activity_type: activity.activity_type.clone(),
            platform_url: activity.platform_url.clone(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn delete_activity(
        &mut self,
        user_id: i64,
        account_id: i64,
        kind: ActivityKind,
    ) -> Result<u64> {
        self.check(FailPoint::DeleteActivity)?;
        let before = self.work.activities.len();
        self.work.activities.retain(|a| {
            !(a.user_id == user_id && a.account_id == Some(account_id) && a.event_kind == kind)
        });
        Ok((before - self.work.activities.len()) as u64)
    }

    async fn commit(&mut self) -> Result<()> {
        self.check(FailPoint::Commit)?;
        if let Some(mut guard) = self.guard.take() {
            *guard = std::mem::take(&mut self.work);
        }
        Ok(())
    }
}
