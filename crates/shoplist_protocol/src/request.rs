//! Client requests as a closed set of operations.

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{Message, OpType};
use shoplist_model::ShoppingList;

/// A message received on a replica's client endpoint, checked for the
/// payload its operation needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Merge this list into the replica's copy.
    EnsureList(ShoppingList),
    /// Delete the list with this uid.
    DeleteList(String),
    /// Read the list with this uid.
    GetList(String),
    /// Read the membership view.
    GetNodes,
}

impl Request {
    /// Uid of the addressed list; `None` for [`Request::GetNodes`].
    #[must_use]
    pub fn list_uid(&self) -> Option<&str> {
        match self {
            Self::EnsureList(list) => Some(list.uid()),
            Self::DeleteList(uid) | Self::GetList(uid) => Some(uid),
            Self::GetNodes => None,
        }
    }

    /// Operation code of the request.
    #[must_use]
    pub fn op(&self) -> OpType {
        match self {
            Self::EnsureList(_) => OpType::EnsureList,
            Self::DeleteList(_) => OpType::DeleteList,
            Self::GetList(_) => OpType::GetList,
            Self::GetNodes => OpType::GetNodes,
        }
    }
}

impl TryFrom<Message> for Request {
    type Error = ProtocolError;

    fn try_from(msg: Message) -> ProtocolResult<Self> {
        let op = msg.op;
        let list = |msg: Message| msg.into_first_list().ok_or(ProtocolError::MissingList(op));
        match op {
            OpType::EnsureList => Ok(Self::EnsureList(list(msg)?)),
            OpType::DeleteList => Ok(Self::DeleteList(list(msg)?.uid().to_string())),
            OpType::GetList => Ok(Self::GetList(list(msg)?.uid().to_string())),
            OpType::GetNodes => Ok(Self::GetNodes),
            OpType::ListResponse
            | OpType::NoListResponse
            | OpType::GossipLists
            | OpType::GossipNodes
            | OpType::NodesResponse
            | OpType::WrongShard
            | OpType::ErrorResponse => Err(ProtocolError::NotARequest(op)),
        }
    }
}
