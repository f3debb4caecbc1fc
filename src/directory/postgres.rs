// Postgres account directory with cached account-state lookups

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use sqlx::{FromRow, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::core::errors::{ConflictKey, StoreError};
use crate::core::models::{AccountRecord, AccountState, LoginIdentifier, NewAccount, Role};
use crate::directory::AccountDirectory;

const NICKNAME_INDEX: &str = "accounts_nickname_lower_key";
const EMAIL_INDEX: &str = "accounts_email_lower_key";

/// Database row structure for account lookup
#[derive(FromRow)]
struct AccountRow {
    account_id: Uuid,
    nickname: String,
    email: String,
    password_hash: String,
    password_salt: String,
    role: String,
    state: String,
    registration_method: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for AccountRecord {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(AccountRecord {
            account_id: row.account_id,
            nickname: row.nickname,
            email: row.email,
            password_hash: row.password_hash,
            password_salt: row.password_salt,
            role: row.role.parse().map_err(StoreError::Backend)?,
            state: row.state.parse().map_err(StoreError::Backend)?,
            registration_method: row.registration_method.parse().map_err(StoreError::Backend)?,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct StateRow {
    state: String,
    role: String,
}

/// Postgres-backed account directory
///
/// Uniqueness is enforced by the `LOWER(nickname)` / `LOWER(email)` unique
/// indexes. Account-state lookups are cached briefly since every
/// authenticated request performs one.
pub struct PgAccountDirectory {
    db_pool: PgPool,
    state_cache: Cache<Uuid, (AccountState, Role)>,
}

impl PgAccountDirectory {
    pub fn new(db_pool: PgPool, state_cache_ttl: Duration) -> Self {
        let state_cache = Cache::builder()
            .time_to_live(state_cache_ttl)
            .max_capacity(10_000)
            .build();

        Self { db_pool, state_cache }
    }

    /// Apply pending migrations from `./migrations`
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.db_pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Migration failed: {}", e)))
    }
}

/// Map a unique-index name to the field it guards
fn conflict_for_constraint(constraint: Option<&str>) -> Option<ConflictKey> {
    match constraint {
        Some(NICKNAME_INDEX) => Some(ConflictKey::Nickname),
        Some(EMAIL_INDEX) => Some(ConflictKey::Email),
        _ => None,
    }
}

fn map_insert_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            if let Some(key) = conflict_for_constraint(db_err.constraint()) {
                return StoreError::Conflict(key);
            }
        }
    }
    StoreError::Backend(format!("Failed to create account: {}", err))
}

#[async_trait]
impl AccountDirectory for PgAccountDirectory {
    async fn check_exists(&self, nickname: &str, email: &str) -> Result<(bool, bool), StoreError> {
        sqlx::query_as::<_, (bool, bool)>(
            "SELECT
                EXISTS(SELECT 1 FROM accounts WHERE LOWER(nickname) = LOWER($1)),
                EXISTS(SELECT 1 FROM accounts WHERE LOWER(email) = LOWER($2))",
        )
        .bind(nickname)
        .bind(email)
        .fetch_one(&self.db_pool)
        .await
        .map_err(|e| StoreError::Backend(format!("Failed to check account existence: {}", e)))
    }

    async fn create_account(&self, account: NewAccount) -> Result<Uuid, StoreError> {
        let account_id = Uuid::new_v4();

        let mut tx = self
            .db_pool
            .begin()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to begin transaction: {}", e)))?;

        sqlx::query(
            "INSERT INTO accounts
                (account_id, nickname, email, password_hash, password_salt, role, state, registration_method)
             VALUES ($1, $2, $3, $4, $5, $6, 'active', $7)",
        )
        .bind(account_id)
        .bind(&account.nickname)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(&account.password_salt)
        .bind(account.role.as_str())
        .bind(account.registration_method.as_str())
        .execute(&mut *tx)
        .await
        .map_err(map_insert_error)?;

        sqlx::query(
            "INSERT INTO identity_audit_log (account_id, event_type, detail, created_at)
             VALUES ($1, 'ACCOUNT_CREATED', $2, NOW())",
        )
        .bind(account_id)
        .bind(account.registration_method.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Backend(format!("Failed to write account audit row: {}", e)))?;

        tx.commit()
            .await
            .map_err(map_insert_error)?;

        Ok(account_id)
    }

    async fn get_account_state(&self, account_id: Uuid) -> Result<Option<(AccountState, Role)>, StoreError> {
        if let Some(cached) = self.state_cache.get(&account_id).await {
            return Ok(Some(cached));
        }

        let row = sqlx::query_as::<_, StateRow>("SELECT state, role FROM accounts WHERE account_id = $1")
            .bind(account_id)
            .fetch_optional(&self.db_pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to load account state: {}", e)))?;

        let result = match row {
            Some(row) => Some((
                row.state.parse::<AccountState>().map_err(StoreError::Backend)?,
                row.role.parse::<Role>().map_err(StoreError::Backend)?,
            )),
            None => None,
        };

        if let Some(value) = result {
            self.state_cache.insert(account_id, value).await;
        }
        Ok(result)
    }

    async fn find_account(&self, identifier: &LoginIdentifier) -> Result<Option<AccountRecord>, StoreError> {
        let query = match identifier {
            LoginIdentifier::Nickname(_) => {
                "SELECT account_id, nickname, email, password_hash, password_salt, role, state,
                        registration_method, created_at
                 FROM accounts WHERE LOWER(nickname) = LOWER($1)"
            }
            LoginIdentifier::Email(_) => {
                "SELECT account_id, nickname, email, password_hash, password_salt, role, state,
                        registration_method, created_at
                 FROM accounts WHERE LOWER(email) = LOWER($1)"
            }
        };

        let row = sqlx::query_as::<_, AccountRow>(query)
            .bind(identifier.value())
            .fetch_optional(&self.db_pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to find account: {}", e)))?;

        row.map(AccountRecord::try_from).transpose()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.db_pool)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Backend(format!("Database ping failed: {}", e)))
    }
}
