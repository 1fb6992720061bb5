//! Bus manager: the user-facing facade
//!
//! Converts advertise/subscribe/publish calls into node operations, applies
//! the publisher-rules policy, and integrates the optional remote bridge.
//! One manager per process is the expected shape; embedders create it at
//! init and thread it through, nodes live as long as the manager.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::chardev::{CharDev, Handle, Ioctl, IoctlReply};
use crate::error::{OrbitError, Result};
use crate::handles::Advertisement;
use crate::master::DeviceMaster;
use crate::meta::{node_path, TopicMeta, PRIORITY_DEFAULT};
use crate::node::{CopyReport, TopicNode};
use crate::pollset::PollWaiter;
use crate::remote::RemoteChannel;
use crate::rules::PublisherRule;

/// Manager construction parameters
#[derive(Debug, Clone, Default)]
pub struct BusConfig {
    /// Program name matched against the publisher rule
    pub module_name: String,
    /// Optional publisher restriction policy
    pub publisher_rule: Option<PublisherRule>,
}

impl BusConfig {
    /// Config for a named module without publisher rules.
    pub fn for_module(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            publisher_rule: None,
        }
    }

    /// Load the publisher rule from a rules file.
    pub fn with_rules_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let rule = PublisherRule::from_file(path.as_ref())?;
        log::info!(
            "using publisher rules from {} (module {})",
            path.as_ref().display(),
            rule.module_name
        );
        self.publisher_rule = Some(rule);
        Ok(self)
    }
}

/// Facade over the device master and the file layer
#[derive(Debug)]
pub struct Manager {
    master: DeviceMaster,
    files: CharDev,
    module_name: String,
    rule: Option<PublisherRule>,
    /// Topics known to exist only on remote peers
    remote_topics: Mutex<HashSet<String>>,
    /// Topics remote peers are subscribed to
    remote_subscriber_topics: Mutex<HashSet<String>>,
    remote_channel: Mutex<Option<Arc<dyn RemoteChannel>>>,
}

impl Manager {
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    pub fn with_config(config: BusConfig) -> Self {
        Self {
            master: DeviceMaster::new(),
            files: CharDev::new(),
            module_name: config.module_name,
            rule: config.publisher_rule,
            remote_topics: Mutex::new(HashSet::new()),
            remote_subscriber_topics: Mutex::new(HashSet::new()),
            remote_channel: Mutex::new(None),
        }
    }

    /// The node index backing this manager.
    pub fn device_master(&self) -> &DeviceMaster {
        &self.master
    }

    /// The file layer backing this manager.
    pub fn device_files(&self) -> &CharDev {
        &self.files
    }

    /// Advertise instance 0 of a topic, publishing `data` as its initial
    /// sample. Joins as a second advertiser when the topic already exists.
    pub fn advertise(
        &self,
        meta: &TopicMeta,
        data: &[u8],
        queue_size: u32,
    ) -> Result<Advertisement> {
        if self.rule_denies(meta) {
            return Ok(Advertisement::denied());
        }

        let node = match self.master.lookup_instance(meta, 0) {
            Some(node) => node,
            None => self.master.advertise(meta, Some(0), PRIORITY_DEFAULT)?.0,
        };

        self.finish_advertise(&node, meta, data, queue_size)
    }

    /// Advertise a topic, allocating a fresh instance when `instance` is
    /// `None`. Returns the advertisement and the instance it landed on.
    pub fn advertise_multi(
        &self,
        meta: &TopicMeta,
        data: &[u8],
        instance: Option<usize>,
        priority: i32,
        queue_size: u32,
    ) -> Result<(Advertisement, usize)> {
        if self.rule_denies(meta) {
            return Ok((Advertisement::denied(), instance.unwrap_or(0)));
        }

        let (node, inst) = match instance {
            None => self.master.advertise(meta, None, priority)?,
            Some(inst) => match self.master.advertise(meta, Some(inst), priority) {
                Ok(found) => found,
                // an existing advertiser is fine: join it as a second one
                Err(OrbitError::Exists { .. }) => {
                    let node = self
                        .master
                        .lookup_instance(meta, inst)
                        .ok_or_else(|| OrbitError::not_found(&meta.name))?;
                    (node, inst)
                }
                Err(e) => return Err(e),
            },
        };

        let advert = self.finish_advertise(&node, meta, data, queue_size)?;
        Ok((advert, inst))
    }

    /// Release the write capability. Sentinel handles pretend success.
    pub fn unadvertise(&self, advert: Advertisement) -> Result<()> {
        drop(advert);
        Ok(())
    }

    /// Subscribe to instance 0 of a topic. The node is created on demand so
    /// subscribers may race ahead of publishers.
    pub fn subscribe(&self, meta: &TopicMeta) -> Result<Handle> {
        self.subscribe_multi(meta, 0)
    }

    /// Subscribe to a specific instance of a topic.
    pub fn subscribe_multi(&self, meta: &TopicMeta, instance: usize) -> Result<Handle> {
        let node = match self.master.lookup_instance(meta, instance) {
            Some(node) => node,
            None => match self.master.advertise(meta, Some(instance), PRIORITY_DEFAULT) {
                Ok((node, _)) => node,
                Err(OrbitError::Exists { .. }) => self
                    .master
                    .lookup_instance(meta, instance)
                    .ok_or_else(|| OrbitError::not_found(&meta.name))?,
                Err(e) => return Err(e),
            },
        };

        Ok(self.files.open_subscriber(&node))
    }

    /// Close a subscription handle.
    pub fn unsubscribe(&self, handle: Handle) -> Result<()> {
        self.files.close(handle)
    }

    /// Publish one sample through an advertisement.
    pub fn publish(&self, meta: &TopicMeta, advert: &Advertisement, data: &[u8]) -> Result<()> {
        let node = match advert.node() {
            Some(node) => node,
            // rule-denied sentinel: silent no-op
            None => return Ok(()),
        };

        if node.meta().name != meta.name || node.meta().payload_size != meta.payload_size {
            return Err(OrbitError::invalid_parameter(
                "meta",
                format!(
                    "advertisement belongs to {}, not {}",
                    node.meta().name,
                    meta.name
                ),
            ));
        }

        node.publish(data)
    }

    /// Copy the next unseen sample into `buf`.
    pub fn copy(&self, meta: &TopicMeta, handle: Handle, buf: &mut [u8]) -> Result<CopyReport> {
        if buf.len() != meta.payload_size {
            return Err(OrbitError::invalid_parameter(
                "buf",
                "buffer does not match topic payload size",
            ));
        }
        self.files.read(handle, buf)
    }

    /// Whether a copy on this handle would deliver something.
    pub fn check(&self, handle: Handle) -> Result<bool> {
        match self.files.ioctl(handle, Ioctl::Updated)? {
            IoctlReply::Updated(updated) => Ok(updated),
            _ => Err(OrbitError::invalid_parameter("handle", "unexpected reply")),
        }
    }

    /// Time of the latest publish on the handle's node, microseconds.
    pub fn stat(&self, handle: Handle) -> Result<u64> {
        match self.files.ioctl(handle, Ioctl::LastUpdate)? {
            IoctlReply::LastUpdate(us) => Ok(us),
            _ => Err(OrbitError::invalid_parameter("handle", "unexpected reply")),
        }
    }

    /// Priority of the handle's node.
    pub fn priority(&self, handle: Handle) -> Result<i32> {
        match self.files.ioctl(handle, Ioctl::GetPriority)? {
            IoctlReply::Priority(priority) => Ok(priority),
            _ => Err(OrbitError::invalid_parameter("handle", "unexpected reply")),
        }
    }

    /// Throttle a subscription to at most one delivery per `interval_ms`.
    pub fn set_interval(&self, handle: Handle, interval_ms: u32) -> Result<()> {
        self.files
            .ioctl(handle, Ioctl::SetInterval(interval_ms.saturating_mul(1000)))?;
        Ok(())
    }

    /// Current subscription throttle in milliseconds.
    pub fn get_interval(&self, handle: Handle) -> Result<u32> {
        match self.files.ioctl(handle, Ioctl::GetInterval)? {
            IoctlReply::Interval(us) => Ok(us / 1000),
            _ => Err(OrbitError::invalid_parameter("handle", "unexpected reply")),
        }
    }

    /// Whether a published topic instance exists, locally or - when the
    /// local lookup fails - on a remote peer.
    pub fn exists(&self, meta: &TopicMeta, instance: usize) -> bool {
        match self.master.lookup_instance(meta, instance) {
            Some(node) => node.is_published(),
            None => self.remote_topics.lock().unwrap().contains(&meta.name),
        }
    }

    /// Establish or tear down a poll registration on a subscription handle.
    pub fn poll(&self, handle: Handle, waiter: &Arc<PollWaiter>, setup: bool) -> Result<()> {
        self.files.poll(handle, waiter, setup)
    }

    /// Attach the remote transport. Existing and future nodes forward
    /// publishes through it once remote subscriptions arrive.
    pub fn set_remote_channel(&self, channel: Arc<dyn RemoteChannel>) {
        self.master.set_remote_channel(Arc::clone(&channel));
        *self.remote_channel.lock().unwrap() = Some(channel);
    }

    /// Inbound hook: a remote peer advertised (or retired) a topic.
    pub fn process_remote_topic(&self, name: &str, is_advertisement: bool) {
        let mut topics = self.remote_topics.lock().unwrap();
        if is_advertisement {
            log::debug!("remote topic advertised: {}", name);
            topics.insert(name.to_string());
        } else {
            log::debug!("remote topic retired: {}", name);
            topics.remove(name);
        }
    }

    /// Inbound hook: a remote peer subscribed to a local topic. Publishes on
    /// the node are forwarded outward until the matching remove arrives.
    pub fn process_add_subscription(&self, name: &str, rate_hz: u32) -> Result<()> {
        log::debug!("remote subscription to {} at {} Hz", name, rate_hz);
        self.remote_subscriber_topics
            .lock()
            .unwrap()
            .insert(name.to_string());

        let path = node_path(name, 0)?;
        match self.master.lookup(&path) {
            Some(node) => node.add_remote_subscriber(),
            None => log::debug!("node {} not created yet", name),
        }
        Ok(())
    }

    /// Inbound hook: a remote peer dropped its subscription.
    pub fn process_remove_subscription(&self, name: &str) -> Result<()> {
        self.remote_subscriber_topics.lock().unwrap().remove(name);

        let path = node_path(name, 0)?;
        match self.master.lookup(&path) {
            Some(node) => {
                node.remove_remote_subscriber();
                Ok(())
            }
            None => Err(OrbitError::not_found(name)),
        }
    }

    /// Inbound hook: a sample arrived from a remote publisher.
    pub fn process_received_message(&self, name: &str, payload: &[u8]) -> Result<()> {
        let path = node_path(name, 0)?;
        let node = self
            .master
            .lookup(&path)
            .ok_or_else(|| OrbitError::not_found(name))?;
        node.publish_remote(payload)
    }

    /// Whether any remote peer is subscribed to this topic.
    pub fn is_remote_subscriber_present(&self, name: &str) -> bool {
        self.remote_subscriber_topics.lock().unwrap().contains(name)
    }

    fn rule_denies(&self, meta: &TopicMeta) -> bool {
        match &self.rule {
            Some(rule) if !rule.allows(&self.module_name, &meta.name) => {
                log::debug!(
                    "not allowing {} to publish topic {}",
                    self.module_name,
                    meta.name
                );
                true
            }
            _ => false,
        }
    }

    /// Shared tail of the advertise paths: open as advertiser, size the
    /// queue, mint the token, announce remotely, publish the initial sample.
    fn finish_advertise(
        &self,
        node: &Arc<TopicNode>,
        meta: &TopicMeta,
        data: &[u8],
        queue_size: u32,
    ) -> Result<Advertisement> {
        if data.len() != meta.payload_size {
            return Err(OrbitError::invalid_parameter(
                "data",
                "advertiser must supply an initial payload of the topic's size",
            ));
        }

        let fd = self.files.open_advertiser(node);

        // Sizing must precede the first publish; a second advertiser finds
        // the queue locked and proceeds with the existing size.
        if let Err(e) = self.files.ioctl(fd, Ioctl::SetQueueSize(queue_size)) {
            if queue_size > 1 {
                log::warn!("failed to set queue size on {}: {}", meta.name, e);
            }
        }

        let reply = self.files.ioctl(fd, Ioctl::Advertiser);
        self.files.close(fd)?;

        let advert = match reply? {
            IoctlReply::Advertiser(advert) => advert,
            _ => return Err(OrbitError::invalid_parameter("handle", "unexpected reply")),
        };

        if let Some(channel) = self.remote_channel.lock().unwrap().clone() {
            if let Err(e) = channel.send_advertise(&meta.name, node.priority()) {
                log::warn!("remote advertise of {} failed: {}", meta.name, e);
            }
        }

        self.publish(meta, &advert, data)?;
        Ok(advert)
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}
