//! Character-device dispatch layer
//!
//! Presents the file-like operation surface (open/close/read/write/ioctl/
//! poll) over topic nodes. Callers address open files by integer handle; a
//! dense table keyed by that integer stores a non-owning reference to the
//! node plus the per-handle access state, so no back pointers from the node
//! into the file layer are needed.

use std::sync::{Arc, Mutex};

use crate::error::{OrbitError, Result};
use crate::handles::Advertisement;
use crate::node::{CopyReport, SubscriberId, TopicNode};
use crate::pollset::PollWaiter;

/// Integer file handle
pub type Handle = usize;

/// Control operations on an open file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ioctl {
    /// Resize the node's ring; advertiser handles only, fails after the
    /// first publish
    SetQueueSize(u32),
    /// Mint the opaque advertiser token; advertiser handles only
    Advertiser,
    /// Whether a copy would deliver something; subscriber handles only
    Updated,
    /// Timestamp of the latest publish, microseconds
    LastUpdate,
    /// Minimum delivery spacing in microseconds; subscriber handles only
    SetInterval(u32),
    /// Current delivery spacing in microseconds
    GetInterval,
    /// Priority the node was created with
    GetPriority,
    /// Whether anything was ever published on the node
    IsPublished,
    /// Packed 32-bit device identity of the node
    DeviceId,
}

/// Typed results of [`Ioctl`] operations
#[derive(Debug)]
pub enum IoctlReply {
    Ok,
    Advertiser(Advertisement),
    Updated(bool),
    LastUpdate(u64),
    Interval(u32),
    Priority(i32),
    Published(bool),
    DeviceId(u32),
}

#[derive(Debug, Clone)]
enum FileAccess {
    Advertiser { primary: bool },
    Subscriber { id: SubscriberId },
}

#[derive(Debug, Clone)]
struct OpenFile {
    node: Arc<TopicNode>,
    access: FileAccess,
}

/// Dense integer-handle table over topic nodes
#[derive(Debug, Default)]
pub struct CharDev {
    files: Mutex<Vec<Option<OpenFile>>>,
}

impl CharDev {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(Vec::new()),
        }
    }

    /// Open a node for reading. Allocates a subscriber slot on the node.
    pub fn open_subscriber(&self, node: &Arc<TopicNode>) -> Handle {
        let id = node.open_subscriber();
        self.insert(OpenFile {
            node: Arc::clone(node),
            access: FileAccess::Subscriber { id },
        })
    }

    /// Open a node for writing. Registers an advertiser on the node.
    pub fn open_advertiser(&self, node: &Arc<TopicNode>) -> Handle {
        let primary = node.open_advertiser();
        self.insert(OpenFile {
            node: Arc::clone(node),
            access: FileAccess::Advertiser { primary },
        })
    }

    /// Close a handle, releasing its per-handle state on the node.
    pub fn close(&self, handle: Handle) -> Result<()> {
        let file = {
            let mut files = self.files.lock().unwrap();
            files
                .get_mut(handle)
                .and_then(Option::take)
                .ok_or_else(|| OrbitError::invalid_parameter("handle", "stale file handle"))?
        };

        match file.access {
            FileAccess::Subscriber { id } => file.node.close_subscriber(id),
            FileAccess::Advertiser { .. } => {
                file.node.close_advertiser();
                Ok(())
            }
        }
    }

    /// Read the next unseen sample into `buf`, which must be exactly the
    /// topic's payload size.
    pub fn read(&self, handle: Handle, buf: &mut [u8]) -> Result<CopyReport> {
        let file = self.file(handle)?;

        if buf.len() != file.node.meta().payload_size {
            return Err(OrbitError::invalid_parameter(
                "buf",
                "buffer does not match topic payload size",
            ));
        }

        match file.access {
            FileAccess::Subscriber { id } => file.node.copy(id, buf),
            FileAccess::Advertiser { .. } => {
                Err(OrbitError::permission("read on an advertiser handle"))
            }
        }
    }

    /// Publish `data`, which must be exactly the topic's payload size.
    /// Returns the number of bytes written.
    pub fn write(&self, handle: Handle, data: &[u8]) -> Result<usize> {
        let file = self.file(handle)?;

        if data.len() != file.node.meta().payload_size {
            return Err(OrbitError::invalid_parameter(
                "data",
                "buffer does not match topic payload size",
            ));
        }

        match file.access {
            FileAccess::Advertiser { .. } => {
                file.node.publish(data)?;
                Ok(data.len())
            }
            FileAccess::Subscriber { .. } => {
                Err(OrbitError::permission("write on a subscriber handle"))
            }
        }
    }

    /// Dispatch a control operation.
    pub fn ioctl(&self, handle: Handle, cmd: Ioctl) -> Result<IoctlReply> {
        let file = self.file(handle)?;
        let node = &file.node;

        match cmd {
            Ioctl::SetQueueSize(depth) => {
                self.require_advertiser(&file, "SET_QUEUE_SIZE")?;
                node.set_queue_size(depth as usize)?;
                Ok(IoctlReply::Ok)
            }
            Ioctl::Advertiser => {
                let primary = match file.access {
                    FileAccess::Advertiser { primary } => primary,
                    FileAccess::Subscriber { .. } => {
                        return Err(OrbitError::permission(
                            "GET_ADVERTISER on a subscriber handle",
                        ))
                    }
                };
                Ok(IoctlReply::Advertiser(Advertisement::new(
                    Arc::clone(node),
                    primary,
                )))
            }
            Ioctl::Updated => {
                let id = self.require_subscriber(&file, "UPDATED")?;
                Ok(IoctlReply::Updated(node.check(id)?))
            }
            Ioctl::LastUpdate => {
                self.require_subscriber(&file, "LAST_UPDATE")?;
                Ok(IoctlReply::LastUpdate(node.last_update_us()))
            }
            Ioctl::SetInterval(interval_us) => {
                let id = self.require_subscriber(&file, "SET_INTERVAL")?;
                node.set_interval(id, interval_us)?;
                Ok(IoctlReply::Ok)
            }
            Ioctl::GetInterval => {
                let id = self.require_subscriber(&file, "GET_INTERVAL")?;
                Ok(IoctlReply::Interval(node.get_interval(id)?))
            }
            Ioctl::GetPriority => {
                self.require_subscriber(&file, "GET_PRIORITY")?;
                Ok(IoctlReply::Priority(node.priority()))
            }
            Ioctl::IsPublished => Ok(IoctlReply::Published(node.is_published())),
            Ioctl::DeviceId => Ok(IoctlReply::DeviceId(node.identity().devid())),
        }
    }

    /// Establish or tear down a poll registration for a subscriber handle.
    pub fn poll(&self, handle: Handle, waiter: &Arc<PollWaiter>, setup: bool) -> Result<()> {
        let file = self.file(handle)?;
        let id = self.require_subscriber(&file, "poll")?;
        file.node.poll(id, waiter, setup)
    }

    /// Number of currently open handles.
    pub fn open_count(&self) -> usize {
        self.files.lock().unwrap().iter().filter(|f| f.is_some()).count()
    }

    fn insert(&self, file: OpenFile) -> Handle {
        let mut files = self.files.lock().unwrap();
        match files.iter().position(Option::is_none) {
            Some(slot) => {
                files[slot] = Some(file);
                slot
            }
            None => {
                files.push(Some(file));
                files.len() - 1
            }
        }
    }

    fn file(&self, handle: Handle) -> Result<OpenFile> {
        self.files
            .lock()
            .unwrap()
            .get(handle)
            .and_then(Option::as_ref)
            .cloned()
            .ok_or_else(|| OrbitError::invalid_parameter("handle", "stale file handle"))
    }

    fn require_advertiser(&self, file: &OpenFile, op: &str) -> Result<()> {
        match file.access {
            FileAccess::Advertiser { .. } => Ok(()),
            FileAccess::Subscriber { .. } => Err(OrbitError::permission(format!(
                "{} on a subscriber handle",
                op
            ))),
        }
    }

    fn require_subscriber(&self, file: &OpenFile, op: &str) -> Result<SubscriberId> {
        match file.access {
            FileAccess::Subscriber { id } => Ok(id),
            FileAccess::Advertiser { .. } => Err(OrbitError::permission(format!(
                "{} on an advertiser handle",
                op
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{TopicMeta, PRIORITY_DEFAULT};

    fn test_node(name: &str, payload_size: usize) -> Arc<TopicNode> {
        let meta = TopicMeta::new(name, payload_size);
        Arc::new(TopicNode::new(meta, 0, PRIORITY_DEFAULT, None).unwrap())
    }

    #[test]
    fn test_handle_slots_are_reused() {
        let files = CharDev::new();
        let node = test_node("tick", 4);

        let a = files.open_subscriber(&node);
        let b = files.open_subscriber(&node);
        assert_ne!(a, b);

        files.close(a).unwrap();
        let c = files.open_subscriber(&node);
        assert_eq!(c, a);

        assert_eq!(files.open_count(), 2);
        assert!(files.close(a).is_ok());
        assert!(files.close(a).is_err());
    }

    #[test]
    fn test_write_requires_advertiser() {
        let files = CharDev::new();
        let node = test_node("tick", 1);

        let sub = files.open_subscriber(&node);
        assert!(matches!(
            files.write(sub, &[0]),
            Err(OrbitError::Permission { .. })
        ));

        let adv = files.open_advertiser(&node);
        assert_eq!(files.write(adv, &[7]).unwrap(), 1);
        assert!(matches!(
            files.read(adv, &mut [0u8; 1]),
            Err(OrbitError::Permission { .. })
        ));
    }

    #[test]
    fn test_buffer_size_is_validated() {
        let files = CharDev::new();
        let node = test_node("tick", 4);

        let adv = files.open_advertiser(&node);
        assert!(files.write(adv, &[0u8; 3]).is_err());

        let sub = files.open_subscriber(&node);
        let mut short = [0u8; 3];
        assert!(files.read(sub, &mut short).is_err());
    }

    #[test]
    fn test_ioctl_gating() {
        let files = CharDev::new();
        let node = test_node("tick", 1);

        let sub = files.open_subscriber(&node);
        let adv = files.open_advertiser(&node);

        assert!(files.ioctl(sub, Ioctl::SetQueueSize(4)).is_err());
        assert!(files.ioctl(adv, Ioctl::SetQueueSize(4)).is_ok());

        assert!(files.ioctl(adv, Ioctl::Updated).is_err());
        assert!(matches!(
            files.ioctl(sub, Ioctl::Updated).unwrap(),
            IoctlReply::Updated(false)
        ));

        // IS_PUBLISHED and DEVICE_ID work on any handle
        assert!(matches!(
            files.ioctl(adv, Ioctl::IsPublished).unwrap(),
            IoctlReply::Published(false)
        ));
        assert!(matches!(
            files.ioctl(sub, Ioctl::DeviceId).unwrap(),
            IoctlReply::DeviceId(0)
        ));
    }
}
