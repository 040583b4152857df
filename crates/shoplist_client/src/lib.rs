//! # Shoplist Client
//!
//! The front end of a shoplist cluster. It routes each list to a replica of
//! the shard that owns it, keeps a local cache of every list it touched and
//! reconciles that cache with replica copies by CRDT merge.
//!
//! ## Components
//!
//! - [`ReplicaTransport`]: request/reply to one replica; [`TcpReplicaTransport`]
//!   shares a single connection between all callers
//! - [`ShardRouter`]: membership view built from `GET_NODES`
//! - [`ShoppingApi`]: list and item operations with retries
//!
//! ```rust,no_run
//! use shoplist_client::{ApiConfig, ShoppingApi};
//!
//! let api = ShoppingApi::connect(ApiConfig::new(vec!["127.0.0.1:5000".into()], 2))?;
//! let list = api.create_list("Weekly")?;
//! api.add_item(list.uid(), "Milk", 2, 0)?;
//! # Ok::<(), shoplist_client::ClientError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod api;
mod config;
mod error;
mod router;
mod transport;

pub use api::{random_uid, ItemUpdate, ShoppingApi, UID_LENGTH};
pub use config::{ApiConfig, ClientConfig, RetryConfig};
pub use error::{ClientError, ClientResult};
pub use router::ShardRouter;
pub use transport::{MockTransport, ReplicaTransport, TcpReplicaTransport};
