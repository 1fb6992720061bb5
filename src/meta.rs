//! Topic metadata and node path construction
//!
//! A topic is identified by an immutable metadata descriptor: its name, the
//! fixed byte size of every sample, and the queue depth a new node starts
//! with. Nodes live under a flat runtime namespace, `"/obj/<name>"` for
//! instance 0 and `"/obj/<name><instance>"` for higher instances.

use crate::config::{MASTER_DEVICE_PATH, MAX_INSTANCES, MAX_PATH_LEN, TOPIC_ROOT};
use crate::error::{OrbitError, Result};

/// Lowest selectable publisher priority
pub const PRIORITY_MIN: i32 = 1;
/// Background / test sources
pub const PRIORITY_VERY_LOW: i32 = 25;
/// Secondary sensors
pub const PRIORITY_LOW: i32 = 50;
/// Default priority for advertisers that do not care
pub const PRIORITY_DEFAULT: i32 = 75;
/// Primary sensors
pub const PRIORITY_HIGH: i32 = 100;
/// Redundancy-critical sources
pub const PRIORITY_VERY_HIGH: i32 = 125;
/// Highest selectable publisher priority
pub const PRIORITY_MAX: i32 = 255;

/// Immutable description of a topic: name, fixed payload size and the queue
/// depth nodes are created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMeta {
    /// Topic name, unique within the bus
    pub name: String,
    /// Exact byte size of every sample published on this topic
    pub payload_size: usize,
    /// Ring depth a fresh node starts with (>= 1)
    pub default_queue_size: usize,
}

impl TopicMeta {
    /// Create a topic descriptor with a single-entry queue.
    pub fn new(name: impl Into<String>, payload_size: usize) -> Self {
        Self {
            name: name.into(),
            payload_size,
            default_queue_size: 1,
        }
    }

    /// Override the queue depth nodes of this topic start with.
    pub fn with_queue_size(mut self, depth: usize) -> Self {
        self.default_queue_size = depth.max(1);
        self
    }
}

/// Build the runtime path of a topic node.
///
/// Instance 0 gets the bare name; higher instances append the shortest
/// decimal form. Fails for empty names, out-of-range instances and paths
/// longer than [`MAX_PATH_LEN`].
pub fn node_path(name: &str, instance: usize) -> Result<String> {
    if name.is_empty() {
        return Err(OrbitError::invalid_parameter("name", "empty topic name"));
    }

    if instance >= MAX_INSTANCES {
        return Err(OrbitError::invalid_parameter(
            "instance",
            format!("instance {} out of range (max {})", instance, MAX_INSTANCES - 1),
        ));
    }

    let path = if instance == 0 {
        format!("{}/{}", TOPIC_ROOT, name)
    } else {
        format!("{}/{}{}", TOPIC_ROOT, name, instance)
    };

    if path.len() > MAX_PATH_LEN {
        return Err(OrbitError::invalid_parameter(
            "name",
            format!("node path exceeds {} bytes", MAX_PATH_LEN),
        ));
    }

    Ok(path)
}

/// Path of the control device that handles advertise requests.
pub fn master_path() -> &'static str {
    MASTER_DEVICE_PATH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_defaults() {
        let meta = TopicMeta::new("vehicle_attitude", 28);
        assert_eq!(meta.name, "vehicle_attitude");
        assert_eq!(meta.payload_size, 28);
        assert_eq!(meta.default_queue_size, 1);

        let meta = TopicMeta::new("vehicle_command", 40).with_queue_size(4);
        assert_eq!(meta.default_queue_size, 4);

        // depth below one is clamped, not an error
        let meta = TopicMeta::new("t", 1).with_queue_size(0);
        assert_eq!(meta.default_queue_size, 1);
    }

    #[test]
    fn test_node_path_instances() {
        assert_eq!(node_path("sensor_gyro", 0).unwrap(), "/obj/sensor_gyro");
        assert_eq!(node_path("sensor_gyro", 1).unwrap(), "/obj/sensor_gyro1");
        assert_eq!(node_path("sensor_gyro", 3).unwrap(), "/obj/sensor_gyro3");
    }

    #[test]
    fn test_node_path_validation() {
        assert!(node_path("", 0).is_err());
        assert!(node_path("sensor_gyro", MAX_INSTANCES).is_err());

        let long = "x".repeat(MAX_PATH_LEN);
        assert!(node_path(&long, 0).is_err());
    }

    #[test]
    fn test_master_path() {
        assert_eq!(master_path(), "/obj/_orb_master");
    }
}
