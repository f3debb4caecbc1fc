// Account directory: persistent accounts with storage-enforced uniqueness

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::errors::StoreError;
use crate::core::models::{AccountRecord, AccountState, LoginIdentifier, NewAccount, Role};

pub mod memory;
pub mod postgres;

/// Account persistence
///
/// `check_exists` is advisory. `create_account` is the authoritative
/// uniqueness check and reports `StoreError::Conflict` when it trips.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Case-insensitive existence of (nickname, email)
    async fn check_exists(&self, nickname: &str, email: &str) -> Result<(bool, bool), StoreError>;

    async fn create_account(&self, account: NewAccount) -> Result<Uuid, StoreError>;

    async fn get_account_state(&self, account_id: Uuid) -> Result<Option<(AccountState, Role)>, StoreError>;

    async fn find_account(&self, identifier: &LoginIdentifier) -> Result<Option<AccountRecord>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
