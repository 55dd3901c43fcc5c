use crate::domain::chat::UserId;
use crate::domain::money::{Amount, Balance};
use crate::domain::payment::{FundRequest, RequestState, Token};
use crate::domain::ports::{
    Directory, IdSet, LinkKey, Mutator, ReplyDirectory, SessionStore, SettingKey, UserDetails,
};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory session store for fund requests.
///
/// Every operation runs inside a single lock scope with no suspension in
/// between, so `advance` and `take_if` behave as the atomic steps the
/// workflow relies on even when admin decisions race across transport
/// suspensions.
#[derive(Default, Clone)]
pub struct InMemorySessions {
    entries: Arc<RwLock<HashMap<Token, FundRequest>>>,
}

impl InMemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessions {
    async fn create(&self, request: FundRequest) -> Token {
        let token = Token::generate();
        self.entries.write().await.insert(token.clone(), request);
        token
    }

    async fn get(&self, token: &Token) -> Option<FundRequest> {
        self.entries.read().await.get(token).cloned()
    }

    async fn update(&self, token: &Token, mutate: Mutator) -> Option<FundRequest> {
        let mut entries = self.entries.write().await;
        let request = entries.get_mut(token)?;
        mutate(request);
        Some(request.clone())
    }

    async fn advance(
        &self,
        token: &Token,
        expected: RequestState,
        next: RequestState,
        mutate: Mutator,
    ) -> Option<FundRequest> {
        let mut entries = self.entries.write().await;
        let request = entries.get_mut(token)?;
        if request.state != expected {
            return None;
        }
        mutate(request);
        request.state = next;
        Some(request.clone())
    }

    async fn take_if(&self, token: &Token, expected: RequestState) -> Option<FundRequest> {
        let mut entries = self.entries.write().await;
        if entries.get(token)?.state != expected {
            return None;
        }
        entries.remove(token)
    }

    async fn delete(&self, token: &Token) -> Option<FundRequest> {
        self.entries.write().await.remove(token)
    }
}

const DEFAULT_LINK_CAPACITY: usize = 4096;

struct LinkTable {
    map: HashMap<LinkKey, UserId>,
    order: VecDeque<LinkKey>,
}

/// Reply-correlation map, bounded to `capacity` links.
///
/// The oldest link is evicted first; a relayed conversation old enough to
/// fall off the end simply stops being reply-routable, which reads the same
/// as any other untracked reply.
#[derive(Clone)]
pub struct InMemoryReplyLinks {
    capacity: usize,
    inner: Arc<RwLock<LinkTable>>,
}

impl Default for InMemoryReplyLinks {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LINK_CAPACITY)
    }
}

impl InMemoryReplyLinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Arc::new(RwLock::new(LinkTable {
                map: HashMap::new(),
                order: VecDeque::new(),
            })),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }
}

#[async_trait]
impl ReplyDirectory for InMemoryReplyLinks {
    async fn link(&self, key: LinkKey, requester: UserId) {
        let mut table = self.inner.write().await;
        if table.map.insert(key, requester).is_none() {
            table.order.push_back(key);
        }
        while table.map.len() > self.capacity {
            match table.order.pop_front() {
                Some(oldest) => {
                    table.map.remove(&oldest);
                }
                None => break,
            }
        }
    }

    async fn resolve(&self, key: &LinkKey) -> Option<UserId> {
        self.inner.read().await.map.get(key).copied()
    }
}

#[derive(Default, Clone)]
struct UserRecord {
    username: Option<String>,
    banned: bool,
}

#[derive(Default)]
struct DirectoryState {
    users: HashMap<UserId, UserRecord>,
    balances: HashMap<UserId, Balance>,
    settings: HashMap<&'static str, String>,
    sets: HashMap<IdSet, BTreeSet<i64>>,
}

/// In-memory stand-in for the remote document store.
///
/// Single lock around the whole state; each trait method is one critical
/// section, which also gives `credit` its required atomicity.
#[derive(Default, Clone)]
pub struct InMemoryDirectory {
    state: Arc<RwLock<DirectoryState>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn upsert_user(&self, id: UserId, username: Option<&str>) -> Result<()> {
        let mut state = self.state.write().await;
        let record = state.users.entry(id).or_default();
        if let Some(username) = username {
            record.username = Some(username.to_string());
        }
        Ok(())
    }

    async fn user_exists(&self, id: UserId) -> Result<bool> {
        Ok(self.state.read().await.users.contains_key(&id))
    }

    async fn user_details(&self, id: UserId) -> Result<Option<UserDetails>> {
        let state = self.state.read().await;
        Ok(state.users.get(&id).map(|record| UserDetails {
            id,
            username: record.username.clone(),
            banned: record.banned,
            balance: state.balances.get(&id).copied().unwrap_or_default(),
        }))
    }

    async fn user_count(&self) -> Result<usize> {
        Ok(self.state.read().await.users.len())
    }

    async fn all_users(&self) -> Result<Vec<UserId>> {
        let state = self.state.read().await;
        let mut users: Vec<UserId> = state.users.keys().copied().collect();
        users.sort();
        Ok(users)
    }

    async fn set_banned(&self, id: UserId, banned: bool) -> Result<()> {
        let mut state = self.state.write().await;
        state.users.entry(id).or_default().banned = banned;
        Ok(())
    }

    async fn is_banned(&self, id: UserId) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.users.get(&id).map(|r| r.banned).unwrap_or(false))
    }

    async fn balance(&self, id: UserId) -> Result<Balance> {
        let state = self.state.read().await;
        Ok(state.balances.get(&id).copied().unwrap_or_default())
    }

    async fn set_balance(&self, id: UserId, balance: Balance) -> Result<()> {
        self.state.write().await.balances.insert(id, balance);
        Ok(())
    }

    async fn credit(&self, id: UserId, amount: Amount) -> Result<Balance> {
        let mut state = self.state.write().await;
        let balance = state.balances.entry(id).or_default();
        balance.credit(amount);
        Ok(*balance)
    }

    async fn debit_floor(&self, id: UserId, amount: Amount) -> Result<Balance> {
        let mut state = self.state.write().await;
        let balance = state.balances.entry(id).or_default();
        balance.debit_floor(amount);
        Ok(*balance)
    }

    async fn setting(&self, key: SettingKey) -> Result<Option<String>> {
        Ok(self.state.read().await.settings.get(key.as_str()).cloned())
    }

    async fn set_setting(&self, key: SettingKey, value: &str) -> Result<()> {
        self.state
            .write()
            .await
            .settings
            .insert(key.as_str(), value.to_string());
        Ok(())
    }

    async fn add_member(&self, set: IdSet, id: i64) -> Result<()> {
        self.state
            .write()
            .await
            .sets
            .entry(set)
            .or_default()
            .insert(id);
        Ok(())
    }

    async fn remove_member(&self, set: IdSet, id: i64) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(members) = state.sets.get_mut(&set) {
            members.remove(&id);
        }
        Ok(())
    }

    async fn members(&self, set: IdSet) -> Result<Vec<i64>> {
        let state = self.state.read().await;
        Ok(state
            .sets
            .get(&set)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn contains(&self, set: IdSet, id: i64) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.sets.get(&set).is_some_and(|m| m.contains(&id)))
    }
}
