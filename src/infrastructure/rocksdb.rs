use crate::domain::chat::UserId;
use crate::domain::money::{Amount, Balance};
use crate::domain::ports::{Directory, IdSet, SettingKey, UserDetails};
use crate::error::{BotError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column family for user records.
pub const CF_USERS: &str = "users";
/// Column family for balances.
pub const CF_BALANCES: &str = "balances";
/// Column family for free-form settings.
pub const CF_SETTINGS: &str = "settings";
/// Column family for named id-sets.
pub const CF_SETS: &str = "sets";

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct UserRecord {
    username: Option<String>,
    banned: bool,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| BotError::Storage(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| BotError::Storage(e.to_string()))
}

fn set_key(set: IdSet) -> &'static str {
    match set {
        IdSet::Admins => "admins",
        IdSet::ForceSub => "force_sub",
    }
}

/// A persistent `Directory` backed by RocksDB.
///
/// Read-modify-write operations (upserts, credits, set edits) are
/// serialized through one mutex so the store-level atomicity the balance
/// operations promise holds for concurrent tasks sharing this handle.
/// `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDbDirectory {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbDirectory {
    /// Opens or creates the database at `path` with all column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = vec![
            ColumnFamilyDescriptor::new(CF_USERS, Options::default()),
            ColumnFamilyDescriptor::new(CF_BALANCES, Options::default()),
            ColumnFamilyDescriptor::new(CF_SETTINGS, Options::default()),
            ColumnFamilyDescriptor::new(CF_SETS, Options::default()),
        ];
        let db = DB::open_cf_descriptors(&opts, path, cfs)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &'static str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| BotError::Storage(format!("missing column family: {name}")))
    }

    fn load_user(&self, id: UserId) -> Result<Option<UserRecord>> {
        let cf = self.cf(CF_USERS)?;
        match self.db.get_cf(cf, id.0.to_be_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn store_user(&self, id: UserId, record: &UserRecord) -> Result<()> {
        let cf = self.cf(CF_USERS)?;
        self.db.put_cf(cf, id.0.to_be_bytes(), encode(record)?)?;
        Ok(())
    }

    fn load_balance(&self, id: UserId) -> Result<Balance> {
        let cf = self.cf(CF_BALANCES)?;
        match self.db.get_cf(cf, id.0.to_be_bytes())? {
            Some(bytes) => decode(&bytes),
            None => Ok(Balance::ZERO),
        }
    }

    fn store_balance(&self, id: UserId, balance: Balance) -> Result<()> {
        let cf = self.cf(CF_BALANCES)?;
        self.db.put_cf(cf, id.0.to_be_bytes(), encode(&balance)?)?;
        Ok(())
    }

    fn load_set(&self, set: IdSet) -> Result<Vec<i64>> {
        let cf = self.cf(CF_SETS)?;
        match self.db.get_cf(cf, set_key(set))? {
            Some(bytes) => decode(&bytes),
            None => Ok(Vec::new()),
        }
    }

    fn store_set(&self, set: IdSet, members: &[i64]) -> Result<()> {
        let cf = self.cf(CF_SETS)?;
        self.db.put_cf(cf, set_key(set), encode(&members)?)?;
        Ok(())
    }
}

#[async_trait]
impl Directory for RocksDbDirectory {
    async fn upsert_user(&self, id: UserId, username: Option<&str>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.load_user(id)?.unwrap_or_default();
        if let Some(username) = username {
            record.username = Some(username.to_string());
        }
        self.store_user(id, &record)
    }

    async fn user_exists(&self, id: UserId) -> Result<bool> {
        Ok(self.load_user(id)?.is_some())
    }

    async fn user_details(&self, id: UserId) -> Result<Option<UserDetails>> {
        let Some(record) = self.load_user(id)? else {
            return Ok(None);
        };
        Ok(Some(UserDetails {
            id,
            username: record.username,
            banned: record.banned,
            balance: self.load_balance(id)?,
        }))
    }

    async fn user_count(&self) -> Result<usize> {
        let cf = self.cf(CF_USERS)?;
        let mut count = 0;
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    async fn all_users(&self) -> Result<Vec<UserId>> {
        let cf = self.cf(CF_USERS)?;
        let mut users = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (key, _value) = item?;
            let raw: [u8; 8] = key
                .as_ref()
                .try_into()
                .map_err(|_| BotError::Storage("malformed user key".to_string()))?;
            users.push(UserId(i64::from_be_bytes(raw)));
        }
        users.sort();
        Ok(users)
    }

    async fn set_banned(&self, id: UserId, banned: bool) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.load_user(id)?.unwrap_or_default();
        record.banned = banned;
        self.store_user(id, &record)
    }

    async fn is_banned(&self, id: UserId) -> Result<bool> {
        Ok(self.load_user(id)?.map(|r| r.banned).unwrap_or(false))
    }

    async fn balance(&self, id: UserId) -> Result<Balance> {
        self.load_balance(id)
    }

    async fn set_balance(&self, id: UserId, balance: Balance) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.store_balance(id, balance)
    }

    async fn credit(&self, id: UserId, amount: Amount) -> Result<Balance> {
        let _guard = self.write_lock.lock().await;
        let mut balance = self.load_balance(id)?;
        balance.credit(amount);
        self.store_balance(id, balance)?;
        Ok(balance)
    }

    async fn debit_floor(&self, id: UserId, amount: Amount) -> Result<Balance> {
        let _guard = self.write_lock.lock().await;
        let mut balance = self.load_balance(id)?;
        balance.debit_floor(amount);
        self.store_balance(id, balance)?;
        Ok(balance)
    }

    async fn setting(&self, key: SettingKey) -> Result<Option<String>> {
        let cf = self.cf(CF_SETTINGS)?;
        match self.db.get_cf(cf, key.as_str())? {
            Some(bytes) => Ok(Some(
                String::from_utf8(bytes.to_vec())
                    .map_err(|e| BotError::Storage(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    async fn set_setting(&self, key: SettingKey, value: &str) -> Result<()> {
        let cf = self.cf(CF_SETTINGS)?;
        self.db.put_cf(cf, key.as_str(), value.as_bytes())?;
        Ok(())
    }

    async fn add_member(&self, set: IdSet, id: i64) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut members = self.load_set(set)?;
        if !members.contains(&id) {
            members.push(id);
            members.sort();
            self.store_set(set, &members)?;
        }
        Ok(())
    }

    async fn remove_member(&self, set: IdSet, id: i64) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut members = self.load_set(set)?;
        members.retain(|member| *member != id);
        self.store_set(set, &members)
    }

    async fn members(&self, set: IdSet) -> Result<Vec<i64>> {
        self.load_set(set)
    }

    async fn contains(&self, set: IdSet, id: i64) -> Result<bool> {
        Ok(self.load_set(set)?.contains(&id))
    }
}
