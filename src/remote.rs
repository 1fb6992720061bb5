//! Remote bridge channel
//!
//! Cross-host topic exchange is optional and lives behind a transport the
//! embedder supplies. The bus only needs the outbound half: announcing local
//! advertisements and forwarding samples to remote subscribers. Inbound
//! traffic enters through the manager's `process_*` hooks, which the
//! embedder's transport glue invokes when frames arrive:
//!
//! - [`Manager::process_remote_topic`] for remote advertisements,
//! - [`Manager::process_add_subscription`] / [`Manager::process_remove_subscription`]
//!   for remote interest in local topics,
//! - [`Manager::process_received_message`] for remote samples.
//!
//! [`Manager::process_remote_topic`]: crate::manager::Manager::process_remote_topic
//! [`Manager::process_add_subscription`]: crate::manager::Manager::process_add_subscription
//! [`Manager::process_remove_subscription`]: crate::manager::Manager::process_remove_subscription
//! [`Manager::process_received_message`]: crate::manager::Manager::process_received_message

use std::fmt;

use crate::error::Result;

/// Outbound transport hooks for cross-host topics.
///
/// Implementations must be callable from any thread; `send_sample` is invoked
/// from the publishing thread after the node lock has been released.
pub trait RemoteChannel: fmt::Debug + Send + Sync {
    /// Announce a local advertisement (or re-announce it) to the peer.
    fn send_advertise(&self, topic: &str, priority: i32) -> Result<()>;

    /// Forward one published sample to the peer.
    fn send_sample(&self, topic: &str, payload: &[u8]) -> Result<()>;
}
