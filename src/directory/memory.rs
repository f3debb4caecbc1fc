// In-memory account directory for development and tests

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::errors::{ConflictKey, StoreError};
use crate::core::models::{AccountRecord, AccountState, LoginIdentifier, NewAccount, Role};
use crate::directory::AccountDirectory;

#[derive(Default)]
struct Accounts {
    by_id: HashMap<Uuid, AccountRecord>,
    // lowercase nickname/email -> account id
    nicknames: HashMap<String, Uuid>,
    emails: HashMap<String, Uuid>,
}

/// Account directory held in process memory
///
/// Uniqueness is checked and indexes updated under one write lock, so
/// concurrent inserts behave like a unique index.
#[derive(Default)]
pub struct MemoryAccountDirectory {
    accounts: RwLock<Accounts>,
}

impl MemoryAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Operator-side state change (block, delete, reactivate)
    pub async fn set_account_state(&self, account_id: Uuid, state: AccountState) -> bool {
        let mut accounts = self.accounts.write().await;
        match accounts.by_id.get_mut(&account_id) {
            Some(record) => {
                record.state = state;
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.accounts.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl AccountDirectory for MemoryAccountDirectory {
    async fn check_exists(&self, nickname: &str, email: &str) -> Result<(bool, bool), StoreError> {
        let accounts = self.accounts.read().await;
        Ok((
            accounts.nicknames.contains_key(&nickname.to_lowercase()),
            accounts.emails.contains_key(&email.to_lowercase()),
        ))
    }

    async fn create_account(&self, account: NewAccount) -> Result<Uuid, StoreError> {
        let nickname_key = account.nickname.to_lowercase();
        let email_key = account.email.to_lowercase();

        let mut accounts = self.accounts.write().await;
        if accounts.nicknames.contains_key(&nickname_key) {
            return Err(StoreError::Conflict(ConflictKey::Nickname));
        }
        if accounts.emails.contains_key(&email_key) {
            return Err(StoreError::Conflict(ConflictKey::Email));
        }

        let account_id = Uuid::new_v4();
        accounts.nicknames.insert(nickname_key, account_id);
        accounts.emails.insert(email_key, account_id);
        accounts.by_id.insert(
            account_id,
            AccountRecord {
                account_id,
                nickname: account.nickname,
                email: account.email,
                password_hash: account.password_hash,
                password_salt: account.password_salt,
                role: account.role,
                state: AccountState::Active,
                registration_method: account.registration_method,
                created_at: Utc::now(),
            },
        );
        Ok(account_id)
    }

    async fn get_account_state(&self, account_id: Uuid) -> Result<Option<(AccountState, Role)>, StoreError> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .by_id
            .get(&account_id)
            .map(|record| (record.state, record.role)))
    }

    async fn find_account(&self, identifier: &LoginIdentifier) -> Result<Option<AccountRecord>, StoreError> {
        let accounts = self.accounts.read().await;
        let key = identifier.value().to_lowercase();
        let id = match identifier {
            LoginIdentifier::Nickname(_) => accounts.nicknames.get(&key),
            LoginIdentifier::Email(_) => accounts.emails.get(&key),
        };
        Ok(id.and_then(|id| accounts.by_id.get(id)).cloned())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
