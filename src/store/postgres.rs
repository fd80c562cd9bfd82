use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};

use super::{LedgerStore, LedgerTx, Result, StoreError};
use crate::types::{
    AccountOpening, AccountStatus, ActivityKind, NewAccountOpening, NewActivity, UserActivity,
    UserRecord,
};

const ACCOUNT_COLUMNS: &str =
    "id, name, account_type, status, points, user_id, referral_code, created_at, updated_at";
const USER_COLUMNS: &str = "id, name, referral_code, points, actions_completed, referral_count";

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLedgerTx { tx: Some(tx) }))
    }

    async fn list_accounts(&self, limit: i64, offset: i64) -> Result<(Vec<AccountOpening>, i64)> {
        let total: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM account_opening"#)
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account_opening
             ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let accounts = rows.iter().map(account_from_row).collect::<Result<_>>()?;
        Ok((accounts, total))
    }

    async fn user(&self, user_id: i64) -> Result<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn activities(&self, user_id: i64) -> Result<Vec<UserActivity>> {
        let rows = sqlx::query(
            r#"SELECT id, user_id, account_id, event_kind, points, activity_type, platform_url, created_at
               FROM user_activities WHERE user_id = $1
               ORDER BY created_at DESC, id DESC"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(activity_from_row).collect()
    }
}

pub struct PgLedgerTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgLedgerTx {
    fn conn(&mut self) -> Result<&mut PgConnection> {
        self.tx.as_mut().map(|tx| &mut **tx).ok_or(StoreError::Finished)
    }
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn account_for_update(&mut self, id: i64) -> Result<Option<AccountOpening>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account_opening WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn insert_account(&mut self, new: &NewAccountOpening) -> Result<AccountOpening> {
        let row = sqlx::query(&format!(
            "INSERT INTO account_opening (name, account_type, status, points, user_id, referral_code)
             VALUES ($1, $2, $3, 0, $4, $5)
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(&new.name)
        .bind(&new.account_type)
        .bind(AccountStatus::Pending.as_str())
        .bind(new.user_id)
        .bind(&new.referral_code)
        .fetch_one(self.conn()?)
        .await?;
        account_from_row(&row)
    }

    async fn set_account_owner(&mut self, id: i64, user_id: i64) -> Result<()> {
        sqlx::query(r#"UPDATE account_opening SET user_id = $2, updated_at = now() WHERE id = $1"#)
            .bind(id)
            .bind(user_id)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn update_account_state(
        &mut self,
        id: i64,
        status: AccountStatus,
        points: i64,
    ) -> Result<AccountOpening> {
        let row = sqlx::query(&format!(
            "UPDATE account_opening SET status = $2, points = $3, updated_at = now()
             WHERE id = $1
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(points)
        .fetch_one(self.conn()?)
        .await?;
        account_from_row(&row)
    }

    async fn delete_account(&mut self, id: i64) -> Result<bool> {
        let res = sqlx::query(r#"DELETE FROM account_opening WHERE id = $1"#)
            .bind(id)
            .execute(self.conn()?)
            .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn user_for_update(&mut self, id: i64) -> Result<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(user)
    }

    async fn user_by_name(&mut self, name: &str) -> Result<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE name = $1 ORDER BY id LIMIT 1 FOR UPDATE"
        ))
        .bind(name)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(user)
    }

    async fn user_by_referral_code(&mut self, code: &str) -> Result<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE referral_code = $1 FOR UPDATE"
        ))
        .bind(code)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(user)
    }

    async fn update_user_counters(&mut self, user: &UserRecord) -> Result<()> {
        sqlx::query(
            r#"UPDATE users SET points = $2, actions_completed = $3, referral_count = $4
               WHERE id = $1"#,
        )
        .bind(user.id)
        .bind(user.points)
        .bind(user.actions_completed)
        .bind(user.referral_count)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn insert_activity(&mut self, activity: &NewActivity) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO user_activities (user_id, account_id, event_kind, points, activity_type, platform_url)
               VALUES ($1, $2, $3, $4, $5, $6)
               ON CONFLICT (user_id, account_id, event_kind) DO NOTHING"#,
        )
        .bind(activity.user_id)
        .bind(activity.account_id)
        .bind(activity.event_kind.as_str())
        .bind(activity.points)
        .bind(&activity.activity_type)
        .bind(&activity.platform_url)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn delete_activity(
        &mut self,
        user_id: i64,
        account_id: i64,
        kind: ActivityKind,
    ) -> Result<u64> {
        let res = sqlx::query(
            r#"DELETE FROM user_activities
               WHERE user_id = $1 AND account_id = $2 AND event_kind = $3"#,
        )
        .bind(user_id)
        .bind(account_id)
        .bind(kind.as_str())
        .execute(self.conn()?)
        .await?;
        Ok(res.rows_affected())
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(StoreError::Finished)?;
        tx.commit().await?;
        Ok(())
    }
}

fn account_from_row(row: &PgRow) -> Result<AccountOpening> {
    let status: String = row.try_get("status")?;
    Ok(AccountOpening {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        account_type: row.try_get("account_type")?,
        status: status
            .parse()
            .map_err(|e: crate::types::ParseEnumError| StoreError::Corrupt(e.to_string()))?,
        points: row.try_get("points")?,
        user_id: row.try_get("user_id")?,
        referral_code: row.try_get("referral_code")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn activity_from_row(row: &PgRow) -> Result<UserActivity> {
    let kind: String = row.try_get("event_kind")?;
    Ok(UserActivity {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        account_id: row.try_get("account_id")?,
        event_kind: kind
            .parse()
            .map_err(|e: crate::types::ParseEnumError| StoreError::Corrupt(e.to_string()))?,
        points: row.try_get("points")?,
        activity_type: row.try_get("activity_type")?,
        platform_url: row.try_get("platform_url")?,
        created_at: row.try_get("created_at")?,
    })
}
