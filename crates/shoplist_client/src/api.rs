//! The shopping list front end.
//!
//! [`ShoppingApi`] fetches the replica's copy of a list, merges it into the
//! locally cached copy, applies the edit there, then ships the whole list to a replica of the owning shard as `ENSURE_LIST`
//! and merges the replica's reply back into the cache. A replica that is
//! unreachable does not lose the edit: it is made on the cached copy alone and
//! [`ShoppingApi::sync_cache`] pushes it later.

use crate::config::ApiConfig;
use crate::error::{ClientError, ClientResult};
use crate::router::ShardRouter;
use crate::transport::{ReplicaTransport, TcpReplicaTransport};
use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::Rng;
use shoplist_crdt::now_millis;
use shoplist_model::{ShoppingItem, ShoppingList};
use shoplist_protocol::{Message, OpType};
use shoplist_storage::ListStore;
use std::thread;
use tracing::{debug, info, warn};

/// Length of generated list and item uids.
pub const UID_LENGTH: usize = 32;

/// Random alphanumeric identifier.
pub fn random_uid(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Fields to change on an item. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemUpdate {
    /// New display name.
    pub name: Option<String>,
    /// New desired quantity.
    pub desired: Option<i64>,
    /// New bought quantity.
    pub current: Option<i64>,
}

impl ItemUpdate {
    /// Creates an update that changes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Renames the item.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the desired quantity.
    pub fn with_desired(mut self, desired: i64) -> Self {
        self.desired = Some(desired);
        self
    }

    /// Sets the bought quantity.
    pub fn with_current(mut self, current: i64) -> Self {
        self.current = Some(current);
        self
    }
}

/// Shopping list operations against a sharded cluster.
pub struct ShoppingApi<T: ReplicaTransport> {
    config: ApiConfig,
    transport: T,
    router: ShardRouter,
    cache: Mutex<ListStore>,
}

impl ShoppingApi<TcpReplicaTransport> {
    /// Creates an API talking TCP to the cluster described by `config`.
    ///
    /// # Errors
    ///
    /// The local cache cannot be opened.
    pub fn connect(config: ApiConfig) -> ClientResult<Self> {
        let transport = TcpReplicaTransport::new(config.client.clone());
        Self::new(config, transport)
    }
}

impl<T: ReplicaTransport> ShoppingApi<T> {
    /// Creates an API over `transport`.
    ///
    /// Membership is fetched lazily on the first call.
    ///
    /// # Errors
    ///
    /// The local cache cannot be opened.
    pub fn new(config: ApiConfig, transport: T) -> ClientResult<Self> {
        let cache = match &config.cache_path {
            Some(path) => ListStore::open(path)?,
            None => ListStore::in_memory(),
        };
        let router = ShardRouter::new(config.seeds.clone(), config.num_shards, config.origin.clone());
        Ok(Self {
            config,
            transport,
            router,
            cache: Mutex::new(cache),
        })
    }

    /// CRDT origin of this instance.
    pub fn origin(&self) -> &str {
        &self.config.origin
    }

    /// The shard router.
    pub fn router(&self) -> &ShardRouter {
        &self.router
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Cached copy of a list, without contacting any replica.
    ///
    /// # Errors
    ///
    /// The cache cannot be read.
    pub fn cached(&self, uid: &str) -> ClientResult<Option<ShoppingList>> {
        Ok(self.cache.lock().read(uid)?)
    }

    /// Creates an empty list named `name`.
    ///
    /// The list is cached before it is sent, so it survives a failed send.
    ///
    /// # Errors
    ///
    /// Cache failures, or a replica error once retries are exhausted.
    pub fn create_list(&self, name: &str) -> ClientResult<ShoppingList> {
        let list = ShoppingList::new(random_uid(UID_LENGTH), name);
        self.cache.lock().write(&list)?;
        info!(list = %list.uid(), %name, "creating list");
        self.ensure(&list)
    }

    /// Fetches a list, merged with the locally cached copy.
    ///
    /// If no replica can be reached the cached copy is returned.
    ///
    /// # Errors
    ///
    /// [`ClientError::ListNotFound`] if neither the replica nor the cache
    /// has the list; a replica error if it is unreachable and nothing is
    /// cached.
    pub fn get_list(&self, uid: &str) -> ClientResult<ShoppingList> {
        let remote = self.fetch(uid);
        let mut cache = self.cache.lock();
        let cached = cache.read(uid)?;

        match (remote, cached) {
            (Ok(Some(remote)), _) => Ok(cache.merge(&remote)?),
            (Ok(None), Some(local)) => Ok(local),
            (Ok(None), None) => Err(ClientError::ListNotFound(uid.to_string())),
            (Err(e), Some(local)) if e.is_retryable() => {
                warn!(list = %uid, error = %e, "replica unavailable, serving cached copy");
                Ok(local)
            }
            (Err(e), _) => Err(e),
        }
    }

    /// Adds a new item and returns the updated list.
    ///
    /// # Errors
    ///
    /// [`ClientError::ListNotFound`], or a replica error once retries are
    /// exhausted. The edit stays cached in that case.
    pub fn add_item(
        &self,
        list_uid: &str,
        name: &str,
        desired: i64,
        current: i64,
    ) -> ClientResult<ShoppingList> {
        let item = ShoppingItem::new(random_uid(UID_LENGTH), name, &self.config.origin, desired, current);
        self.mutate(list_uid, move |list| {
            list.add(item)?;
            Ok(())
        })
    }

    /// Changes an existing item and returns the updated list.
    ///
    /// # Errors
    ///
    /// [`ClientError::ListNotFound`], an item-not-found model error, or a
    /// replica error once retries are exhausted.
    pub fn update_item(
        &self,
        list_uid: &str,
        item_uid: &str,
        update: ItemUpdate,
    ) -> ClientResult<ShoppingList> {
        let origin = self.config.origin.clone();
        self.mutate(list_uid, move |list| {
            let item = list.get_item_mut(item_uid)?;
            if let Some(name) = update.name {
                item.set_name(&origin, now_millis(), name);
            }
            if let Some(desired) = update.desired {
                item.set_desired_quantity(&origin, desired);
            }
            if let Some(current) = update.current {
                item.set_current_quantity(&origin, current);
            }
            Ok(())
        })
    }

    /// Removes an item and returns the updated list.
    ///
    /// # Errors
    ///
    /// [`ClientError::ListNotFound`], an item-not-found model error, or a
    /// replica error once retries are exhausted.
    pub fn remove_item(&self, list_uid: &str, item_uid: &str) -> ClientResult<ShoppingList> {
        self.mutate(list_uid, |list| {
            list.get_item(item_uid)?;
            list.remove(item_uid);
            Ok(())
        })
    }

    /// Deletes a list from its shard and from the cache.
    ///
    /// # Errors
    ///
    /// A replica error once retries are exhausted; the cached copy is
    /// removed regardless.
    pub fn delete_list(&self, uid: &str) -> ClientResult<()> {
        self.cache.lock().delete(uid)?;
        let reply = self.call_shard(uid, |ts| Message::delete_list(&self.config.origin, ts, uid))?;
        match reply.op {
            OpType::NoListResponse | OpType::ListResponse => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Pushes every cached list to its shard and merges the replies back.
    ///
    /// Returns the number of lists synced. Lists whose shard cannot be
    /// reached are skipped and stay cached.
    ///
    /// # Errors
    ///
    /// The cache cannot be read.
    pub fn sync_cache(&self) -> ClientResult<usize> {
        let lists = self.cache.lock().read_all()?;
        let mut synced = 0;
        for list in &lists {
            match self.ensure(list) {
                Ok(_) => synced += 1,
                Err(e) => warn!(list = %list.uid(), error = %e, "cache sync failed"),
            }
        }
        debug!(synced, total = lists.len(), "cache synced");
        Ok(synced)
    }

    fn mutate<F>(&self, uid: &str, edit: F) -> ClientResult<ShoppingList>
    where
        F: FnOnce(&mut ShoppingList) -> ClientResult<()>,
    {
        // Absolute quantity sets become deltas against the copy being edited,
        // so the replica's view has to be folded in first
        let remote = match self.fetch(uid) {
            Ok(remote) => remote,
            Err(e) if e.is_retryable() && self.cache.lock().read(uid)?.is_some() => {
                warn!(list = %uid, error = %e, "replica unavailable, editing cached copy");
                None
            }
            Err(e) => return Err(e),
        };

        let list = {
            let mut cache = self.cache.lock();
            let mut list = match (cache.read(uid)?, remote) {
                (Some(mut local), Some(remote)) => {
                    shoplist_crdt::Merge::merge(&mut local, &remote);
                    local
                }
                (Some(local), None) => local,
                (None, Some(remote)) => remote,
                (None, None) => return Err(ClientError::ListNotFound(uid.to_string())),
            };
            edit(&mut list)?;
            cache.write(&list)?;
            list
        };

        self.ensure(&list)
    }

    fn ensure(&self, list: &ShoppingList) -> ClientResult<ShoppingList> {
        let reply = self.call_shard(list.uid(), |ts| {
            Message::ensure_list(&self.config.origin, ts, list.clone())
        })?;
        match reply.op {
            OpType::ListResponse => {
                let Some(merged) = reply.into_first_list() else {
                    return Err(ClientError::Protocol("list reply without a list".into()));
                };
                Ok(self.cache.lock().merge(&merged)?)
            }
            other => Err(unexpected(other)),
        }
    }

    fn fetch(&self, uid: &str) -> ClientResult<Option<ShoppingList>> {
        let reply = self.call_shard(uid, |ts| Message::get_list(&self.config.origin, ts, uid))?;
        match reply.op {
            OpType::ListResponse => Ok(reply.into_first_list()),
            OpType::NoListResponse => Ok(None),
            other => Err(unexpected(other)),
        }
    }

    /// Sends a request for list `uid` to its shard, retrying per the
    /// configured policy.
    fn call_shard<F>(&self, uid: &str, build: F) -> ClientResult<Message>
    where
        F: Fn(u64) -> Message,
    {
        let retry = &self.config.retry;
        let attempts = retry.max_attempts.max(1);
        let mut last_err = ClientError::NoReplica {
            shard: self.router.shard_of(uid),
        };

        for attempt in 0..attempts {
            let delay = retry.delay_for_attempt(attempt);
            if !delay.is_zero() {
                thread::sleep(delay);
            }

            match self.try_replicas(uid, &build) {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_retryable() => {
                    debug!(list = %uid, attempt, error = %e, "replica call failed");
                    if matches!(
                        e,
                        ClientError::WrongShard { .. } | ClientError::NoReplica { .. }
                    ) {
                        if let Err(refresh) = self.router.refresh(&self.transport) {
                            debug!(error = %refresh, "membership refresh failed");
                        }
                    }
                    last_err = e;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err)
    }

    fn try_replicas<F>(&self, uid: &str, build: &F) -> ClientResult<Message>
    where
        F: Fn(u64) -> Message,
    {
        let replicas = match self.router.replicas_for(uid) {
            Ok(replicas) => replicas,
            Err(_) => {
                self.router.refresh(&self.transport)?;
                self.router.replicas_for(uid)?
            }
        };

        let mut last_err = ClientError::NoReplica {
            shard: self.router.shard_of(uid),
        };
        for endpoint in &replicas {
            match self.transport.request(endpoint, &build(now_millis())) {
                Ok(reply) => match reply.op {
                    OpType::WrongShard => {
                        return Err(ClientError::WrongShard {
                            list: uid.to_string(),
                            detail: reply.detail.unwrap_or_default(),
                        });
                    }
                    OpType::ErrorResponse => {
                        let detail = reply.detail.unwrap_or_default();
                        debug!(%endpoint, %detail, "replica rejected request");
                        last_err = ClientError::ServerError(detail);
                    }
                    _ => return Ok(reply),
                },
                Err(e) if e.is_retryable() => {
                    debug!(%endpoint, error = %e, "replica unreachable, trying next");
                    last_err = e;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err)
    }
}

impl<T: ReplicaTransport> std::fmt::Debug for ShoppingApi<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShoppingApi")
            .field("origin", &self.config.origin)
            .field("router", &self.router)
            .finish()
    }
}

fn unexpected(op: OpType) -> ClientError {
    ClientError::Protocol(format!("unexpected reply {op:?}"))
}
