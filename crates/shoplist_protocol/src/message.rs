//! The message envelope shared by client and replica traffic.

use crate::error::ProtocolError;
use crate::node_info::NodeInfo;
use serde::{Deserialize, Serialize};
use shoplist_model::ShoppingList;

/// Operation code of a [`Message`].
///
/// Encoded on the wire as a single unsigned integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum OpType {
    /// Idempotent upsert of `lists[0]`.
    EnsureList = 1,
    /// Hard delete of `lists[0].uid`.
    DeleteList = 2,
    /// Read of `lists[0].uid`.
    GetList = 3,
    /// Reply carrying the found list.
    ListResponse = 4,
    /// Reply for an absent list, echoing an empty list with the requested uid.
    NoListResponse = 5,
    /// Anti-entropy batch of full list snapshots.
    GossipLists = 6,
    /// Membership snapshot.
    GossipNodes = 7,
    /// Membership query.
    GetNodes = 8,
    /// Reply to [`OpType::GetNodes`].
    NodesResponse = 9,
    /// The addressed list belongs to another shard; nothing was applied.
    WrongShard = 10,
    /// The request was malformed or could not be served.
    ErrorResponse = 11,
}

impl OpType {
    /// Returns true for the reply codes a replica sends to a client.
    #[must_use]
    pub const fn is_reply(self) -> bool {
        matches!(
            self,
            Self::ListResponse
                | Self::NoListResponse
                | Self::NodesResponse
                | Self::WrongShard
                | Self::ErrorResponse
        )
    }
}

impl TryFrom<u8> for OpType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Self::EnsureList,
            2 => Self::DeleteList,
            3 => Self::GetList,
            4 => Self::ListResponse,
            5 => Self::NoListResponse,
            6 => Self::GossipLists,
            7 => Self::GossipNodes,
            8 => Self::GetNodes,
            9 => Self::NodesResponse,
            10 => Self::WrongShard,
            11 => Self::ErrorResponse,
            other => return Err(ProtocolError::UnknownOp(other)),
        })
    }
}

impl From<OpType> for u8 {
    fn from(op: OpType) -> Self {
        op as u8
    }
}

/// One frame on the wire: `{op, origin, ts, lists, nodes}`.
///
/// Requests that address a list carry it in `lists[0]`. Replies reuse the
/// same envelope. `detail` is only set on [`OpType::WrongShard`] and
/// [`OpType::ErrorResponse`] and is omitted from the frame otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Operation code.
    pub op: OpType,
    /// Id of the node or client that produced the message.
    pub origin: String,
    /// Production time, epoch millis.
    pub ts: u64,
    /// List payloads.
    #[serde(default)]
    pub lists: Vec<ShoppingList>,
    /// Membership payloads.
    #[serde(default)]
    pub nodes: Vec<NodeInfo>,
    /// Human readable reason for error replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Message {
    fn new(op: OpType, origin: &str, ts: u64) -> Self {
        Self {
            op,
            origin: origin.to_string(),
            ts,
            lists: Vec::new(),
            nodes: Vec::new(),
            detail: None,
        }
    }

    fn with_lists(mut self, lists: Vec<ShoppingList>) -> Self {
        self.lists = lists;
        self
    }

    fn with_nodes(mut self, nodes: Vec<NodeInfo>) -> Self {
        self.nodes = nodes;
        self
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Upsert `list` on the receiving replica.
    #[must_use]
    pub fn ensure_list(origin: &str, ts: u64, list: ShoppingList) -> Self {
        Self::new(OpType::EnsureList, origin, ts).with_lists(vec![list])
    }

    /// Delete the list `uid`.
    #[must_use]
    pub fn delete_list(origin: &str, ts: u64, uid: &str) -> Self {
        Self::new(OpType::DeleteList, origin, ts).with_lists(vec![ShoppingList::empty(uid)])
    }

    /// Read the list `uid`.
    #[must_use]
    pub fn get_list(origin: &str, ts: u64, uid: &str) -> Self {
        Self::new(OpType::GetList, origin, ts).with_lists(vec![ShoppingList::empty(uid)])
    }

    /// Reply with `list`, or with not-found semantics if `found` is false.
    #[must_use]
    pub fn list_response(found: bool, origin: &str, ts: u64, list: ShoppingList) -> Self {
        let op = if found {
            OpType::ListResponse
        } else {
            OpType::NoListResponse
        };
        Self::new(op, origin, ts).with_lists(vec![list])
    }

    /// Reject a request for list `uid`, which is owned by `owner_shard`.
    #[must_use]
    pub fn wrong_shard(origin: &str, ts: u64, uid: &str, owner_shard: u32) -> Self {
        Self::new(OpType::WrongShard, origin, ts)
            .with_lists(vec![ShoppingList::empty(uid)])
            .with_detail(format!("list {uid} belongs to shard {owner_shard}"))
    }

    /// Reject a request that could not be served.
    #[must_use]
    pub fn error_response(origin: &str, ts: u64, reason: impl Into<String>) -> Self {
        Self::new(OpType::ErrorResponse, origin, ts).with_detail(reason)
    }

    /// Anti-entropy batch.
    #[must_use]
    pub fn gossip_lists(origin: &str, ts: u64, lists: Vec<ShoppingList>) -> Self {
        Self::new(OpType::GossipLists, origin, ts).with_lists(lists)
    }

    /// Membership snapshot.
    #[must_use]
    pub fn gossip_nodes(origin: &str, ts: u64, nodes: Vec<NodeInfo>) -> Self {
        Self::new(OpType::GossipNodes, origin, ts).with_nodes(nodes)
    }

    /// Membership query.
    #[must_use]
    pub fn get_nodes(origin: &str, ts: u64) -> Self {
        Self::new(OpType::GetNodes, origin, ts)
    }

    /// Membership reply.
    #[must_use]
    pub fn nodes_response(origin: &str, ts: u64, nodes: Vec<NodeInfo>) -> Self {
        Self::new(OpType::NodesResponse, origin, ts).with_nodes(nodes)
    }

    /// Uid of the addressed list, if the message carries one.
    #[must_use]
    pub fn list_uid(&self) -> Option<&str> {
        self.lists.first().map(ShoppingList::uid)
    }

    /// The first list payload, if any.
    #[must_use]
    pub fn first_list(&self) -> Option<&ShoppingList> {
        self.lists.first()
    }

    /// Consumes the message, returning its first list payload.
    #[must_use]
    pub fn into_first_list(self) -> Option<ShoppingList> {
        self.lists.into_iter().next()
    }
}
