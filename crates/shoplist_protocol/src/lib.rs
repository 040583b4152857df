//! # Shoplist Protocol
//!
//! Everything two shoplist processes agree on:
//!
//! - [`Message`] and [`OpType`]: the single envelope used for client requests,
//!   replies, shard gossip and membership gossip
//! - [`NodeInfo`]: one replica's addresses and heartbeat
//! - [`Request`]: a client message checked and split by operation
//! - [`frame`]: length-prefixed CBOR framing over blocking or async streams
//! - [`shard_for`]: the uid to shard mapping shared by clients and replicas
//!
//! This crate performs I/O only through the stream it is handed.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod frame;
mod message;
mod node_info;
mod request;
mod shard;

pub use error::{ProtocolError, ProtocolResult};
pub use frame::{
    encode_frame, read_frame, read_frame_async, write_frame, write_frame_async, MAX_FRAME_SIZE,
};
pub use message::{Message, OpType};
pub use node_info::NodeInfo;
pub use request::Request;
pub use shard::{list_hash, shard_for};
