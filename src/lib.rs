//! # Orbit - In-Process Publish/Subscribe Message Bus
//!
//! Orbit is a lightweight publish/subscribe message bus for robotics and
//! flight-control systems. Producers advertise strongly-typed, fixed-layout
//! topics; consumers read the latest value, optionally with a small history
//! queue, and can wait for new samples with file-descriptor-style polling.
//!
//! ## Features
//!
//! - **Topic nodes**: per-(topic, instance) ring of published samples with a
//!   monotonic generation counter
//! - **Multi-instance topics**: several independent publishers of the same
//!   type, each with a priority
//! - **Poll waiters**: race-free new-sample notification without a broker
//! - **Interval throttling**: per-subscriber delivery rate limits
//! - **Publisher rules**: deployment-level restrictions on who may publish
//! - **Remote bridge**: optional forwarding of topics across hosts through
//!   an embedder-supplied transport
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   Manager                       │
//! │   advertise / subscribe / publish / copy        │
//! ├───────────────────────┬─────────────────────────┤
//! │     DeviceMaster      │        CharDev          │
//! │   path → node index   │  integer file handles   │
//! ├───────────────────────┴─────────────────────────┤
//! │                  TopicNode                      │
//! │   sample ring │ generations │ poll waiters      │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use orbit::{Manager, TopicMeta};
//!
//! let bus = Manager::new();
//! let meta = TopicMeta::new("vehicle_tick", 4);
//!
//! let advert = bus.advertise(&meta, &1u32.to_le_bytes(), 1).unwrap();
//! let sub = bus.subscribe(&meta).unwrap();
//!
//! bus.publish(&meta, &advert, &2u32.to_le_bytes()).unwrap();
//!
//! let mut buf = [0u8; 4];
//! bus.copy(&meta, sub, &mut buf).unwrap();
//! assert_eq!(u32::from_le_bytes(buf), 2);
//! ```

pub mod chardev;
pub mod clock;
pub mod device_id;
pub mod error;
pub mod handles;
pub mod manager;
pub mod master;
pub mod meta;
pub mod node;
pub mod pollset;
pub mod remote;
pub mod rules;

// Main API re-exports
pub use chardev::{CharDev, Handle, Ioctl, IoctlReply};
pub use device_id::{DeviceBusType, DeviceIdentity};
pub use error::{OrbitError, Result};
pub use handles::Advertisement;
pub use manager::{BusConfig, Manager};
pub use master::DeviceMaster;
pub use meta::{
    node_path, TopicMeta, PRIORITY_DEFAULT, PRIORITY_HIGH, PRIORITY_LOW, PRIORITY_MAX,
    PRIORITY_MIN, PRIORITY_VERY_HIGH, PRIORITY_VERY_LOW,
};
pub use node::{CopyReport, SubscriberId, TopicNode};
pub use pollset::{PollEvents, PollSet, PollWaiter};
pub use remote::RemoteChannel;
pub use rules::PublisherRule;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Compile-time limits and path conventions
pub mod config {
    /// Root of the runtime topic namespace
    pub const TOPIC_ROOT: &str = "/obj";

    /// Path of the control device handling advertise requests
    pub const MASTER_DEVICE_PATH: &str = "/obj/_orb_master";

    /// Maximum length of a node path in bytes
    pub const MAX_PATH_LEN: usize = 100;

    /// Maximum number of instances per topic
    pub const MAX_INSTANCES: usize = 4;

    /// Maximum ring depth of a node
    pub const MAX_QUEUE_SIZE: usize = 255;

    /// Maximum number of simultaneously registered poll waiters per node
    pub const MAX_POLL_WAITERS: usize = 255;
}
