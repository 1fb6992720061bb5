//! Topic node: storage and coordination for one (topic, instance)
//!
//! A node owns a fixed-size ring of published samples, a monotonically
//! increasing publish generation, the registered subscribers with their
//! read positions and interval throttles, and the poll waiters to wake on
//! publication. All mutable state sits behind one mutex; the generation is
//! mirrored in an atomic so existence checks stay lock-free.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::clock::monotonic_us;
use crate::config::MAX_QUEUE_SIZE;
use crate::device_id::DeviceIdentity;
use crate::error::{OrbitError, Result};
use crate::meta::{node_path, TopicMeta};
use crate::pollset::{PollEvents, PollSet, PollWaiter};
use crate::remote::RemoteChannel;

/// Index of a subscriber slot within its node
pub type SubscriberId = usize;

/// Outcome of a successful copy: which sample was delivered and how many
/// the subscriber lost by falling behind the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyReport {
    /// Generation of the delivered sample (1 = first publish on the node)
    pub generation: u64,
    /// Samples skipped because the ring overwrote them before this read
    pub missed: u64,
}

#[derive(Debug, Clone)]
struct SubscriberState {
    /// Generation of the newest sample this subscriber has consumed;
    /// `None` means it has never been positioned.
    last_seen: Option<u64>,
    /// Minimum spacing between deliveries, 0 = unthrottled
    interval_us: u32,
    /// Bus-clock time of the latest delivery, 0 = never
    last_delivered_us: u64,
}

#[derive(Debug)]
struct NodeState {
    /// Ring storage, `queue_size * payload_size` bytes
    slots: Vec<u8>,
    queue_size: usize,
    /// Set on first publish; queue resizing is refused from then on
    queue_locked: bool,
    advertised: bool,
    advertiser_count: u32,
    open_count: u32,
    subscribers: Vec<Option<SubscriberState>>,
    pollset: PollSet,
    last_publish_us: u64,
    lost_samples: u64,
    remote_subscribers: u32,
    remote_publisher_seen: bool,
    remote_channel: Option<Arc<dyn RemoteChannel>>,
}

impl NodeState {
    fn subscriber(&self, id: SubscriberId) -> Result<&SubscriberState> {
        self.subscribers
            .get(id)
            .and_then(Option::as_ref)
            .ok_or_else(|| OrbitError::invalid_parameter("subscriber", "unknown subscriber slot"))
    }

    fn subscriber_mut(&mut self, id: SubscriberId) -> Result<&mut SubscriberState> {
        self.subscribers
            .get_mut(id)
            .and_then(Option::as_mut)
            .ok_or_else(|| OrbitError::invalid_parameter("subscriber", "unknown subscriber slot"))
    }
}

/// Runtime object for one (topic, instance)
#[derive(Debug)]
pub struct TopicNode {
    meta: TopicMeta,
    instance: usize,
    priority: i32,
    path: String,
    identity: DeviceIdentity,
    /// Mirror of the publish count, written with the state lock held
    generation: AtomicU64,
    state: Mutex<NodeState>,
}

impl TopicNode {
    pub(crate) fn new(
        meta: TopicMeta,
        instance: usize,
        priority: i32,
        remote_channel: Option<Arc<dyn RemoteChannel>>,
    ) -> Result<Self> {
        let path = node_path(&meta.name, instance)?;
        let queue_size = meta.default_queue_size.clamp(1, MAX_QUEUE_SIZE);

        Ok(Self {
            state: Mutex::new(NodeState {
                slots: vec![0u8; queue_size * meta.payload_size],
                queue_size,
                queue_locked: false,
                advertised: false,
                advertiser_count: 0,
                open_count: 0,
                subscribers: Vec::new(),
                pollset: PollSet::new(),
                last_publish_us: 0,
                lost_samples: 0,
                remote_subscribers: 0,
                remote_publisher_seen: false,
                remote_channel,
            }),
            generation: AtomicU64::new(0),
            identity: DeviceIdentity::default(),
            path,
            priority,
            instance,
            meta,
        })
    }

    pub fn meta(&self) -> &TopicMeta {
        &self.meta
    }

    pub fn instance(&self) -> usize {
        self.instance
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    /// Total number of successful publishes since node creation.
    pub fn last_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Whether at least one sample has ever been published.
    pub fn is_published(&self) -> bool {
        self.last_generation() > 0
    }

    /// Timestamp of the most recent publish, microseconds on the bus clock.
    pub fn last_update_us(&self) -> u64 {
        self.state.lock().unwrap().last_publish_us
    }

    /// Samples overwritten before any subscriber read them.
    pub fn lost_samples(&self) -> u64 {
        self.state.lock().unwrap().lost_samples
    }

    /// Current ring depth.
    pub fn queue_size(&self) -> usize {
        self.state.lock().unwrap().queue_size
    }

    /// Whether the node currently has a registered advertiser.
    pub fn has_advertiser(&self) -> bool {
        self.state.lock().unwrap().advertised
    }

    /// Whether a remote peer has injected samples into this node.
    pub fn has_remote_publisher(&self) -> bool {
        self.state.lock().unwrap().remote_publisher_seen
    }

    /// Number of remote subscriptions currently forwarding publishes.
    pub fn remote_subscriber_count(&self) -> u32 {
        self.state.lock().unwrap().remote_subscribers
    }

    /// Register a subscriber. It is positioned at the current generation, so
    /// it only observes publishes that happen after the open.
    pub fn open_subscriber(&self) -> SubscriberId {
        let mut st = self.state.lock().unwrap();

        let sub = SubscriberState {
            last_seen: Some(self.generation.load(Ordering::Relaxed)),
            interval_us: 0,
            last_delivered_us: 0,
        };

        let id = match st.subscribers.iter().position(Option::is_none) {
            Some(slot) => {
                st.subscribers[slot] = Some(sub);
                slot
            }
            None => {
                st.subscribers.push(Some(sub));
                st.subscribers.len() - 1
            }
        };

        st.open_count += 1;
        if st.open_count == 1 {
            self.open_first();
        }

        id
    }

    /// Remove a subscriber slot.
    pub fn close_subscriber(&self, id: SubscriberId) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        st.subscriber(id)?;
        st.subscribers[id] = None;

        st.open_count = st.open_count.saturating_sub(1);
        if st.open_count == 0 {
            self.close_last();
        }
        Ok(())
    }

    /// Register an advertiser. Returns whether this is the primary (first)
    /// advertiser on the node.
    pub fn open_advertiser(&self) -> bool {
        let mut st = self.state.lock().unwrap();
        let primary = st.advertiser_count == 0;
        st.advertiser_count += 1;
        st.advertised = true;

        st.open_count += 1;
        if st.open_count == 1 {
            self.open_first();
        }

        primary
    }

    /// Release an advertiser registration taken by [`open_advertiser`]
    /// (file-handle close path: also drops the open count).
    ///
    /// [`open_advertiser`]: Self::open_advertiser
    pub fn close_advertiser(&self) {
        let mut st = self.state.lock().unwrap();
        st.advertiser_count = st.advertiser_count.saturating_sub(1);
        if st.advertiser_count == 0 {
            st.advertised = false;
        }

        st.open_count = st.open_count.saturating_sub(1);
        if st.open_count == 0 {
            self.close_last();
        }
    }

    /// Take an additional advertiser registration without an open count
    /// (advertiser tokens detached from their file handle).
    pub(crate) fn retain_advertiser(&self) {
        let mut st = self.state.lock().unwrap();
        st.advertiser_count += 1;
        st.advertised = true;
    }

    /// Release a registration taken with [`retain_advertiser`].
    ///
    /// [`retain_advertiser`]: Self::retain_advertiser
    pub(crate) fn release_advertiser(&self) {
        let mut st = self.state.lock().unwrap();
        st.advertiser_count = st.advertiser_count.saturating_sub(1);
        if st.advertiser_count == 0 {
            st.advertised = false;
        }
    }

    /// Store one sample, advance the generation and wake poll waiters.
    ///
    /// The ring is left untouched when validation fails. Remote forwarding
    /// happens after the lock is released.
    pub fn publish(&self, data: &[u8]) -> Result<()> {
        if data.len() != self.meta.payload_size {
            return Err(OrbitError::invalid_parameter(
                "data",
                format!(
                    "payload is {} bytes, topic {} carries {}",
                    data.len(),
                    self.meta.name,
                    self.meta.payload_size
                ),
            ));
        }

        let forward = {
            let mut st = self.state.lock().unwrap();

            let head = self.generation.load(Ordering::Relaxed);
            let slot = (head % st.queue_size as u64) as usize;
            let size = self.meta.payload_size;
            st.slots[slot * size..(slot + 1) * size].copy_from_slice(data);

            self.generation.store(head + 1, Ordering::Release);
            st.queue_locked = true;
            st.last_publish_us = monotonic_us();

            st.pollset.notify_all(PollEvents::READABLE);

            if st.remote_subscribers > 0 {
                st.remote_channel.clone()
            } else {
                None
            }
        };

        if let Some(channel) = forward {
            if let Err(e) = channel.send_sample(&self.meta.name, data) {
                log::warn!("forwarding {} to remote peer failed: {}", self.meta.name, e);
            }
        }

        Ok(())
    }

    /// Deliver the oldest sample this subscriber has not seen.
    ///
    /// Subscribers that fell `queue_size` or more behind are clamped forward
    /// to the oldest retained sample; the skip is reported in the returned
    /// [`CopyReport`] and accumulated in the node's lost-sample counter.
    pub fn copy(&self, id: SubscriberId, out: &mut [u8]) -> Result<CopyReport> {
        if out.len() != self.meta.payload_size {
            return Err(OrbitError::invalid_parameter(
                "out",
                format!(
                    "buffer is {} bytes, topic {} carries {}",
                    out.len(),
                    self.meta.name,
                    self.meta.payload_size
                ),
            ));
        }

        let mut st = self.state.lock().unwrap();
        let head = self.generation.load(Ordering::Relaxed);
        let queue_size = st.queue_size as u64;

        let (next_unseen, interval_us, last_delivered_us) = {
            let sub = st.subscriber(id)?;
            (
                sub.last_seen.map_or(1, |g| g + 1),
                sub.interval_us,
                sub.last_delivered_us,
            )
        };

        let oldest = if head > queue_size {
            head - queue_size + 1
        } else {
            1
        };
        let next = next_unseen.max(oldest);

        if next > head {
            return Err(OrbitError::NoData);
        }

        let now = monotonic_us();
        if interval_us > 0
            && last_delivered_us > 0
            && now.saturating_sub(last_delivered_us) < interval_us as u64
        {
            return Err(OrbitError::NoData);
        }

        let slot = ((next - 1) % queue_size) as usize;
        let size = self.meta.payload_size;
        out.copy_from_slice(&st.slots[slot * size..(slot + 1) * size]);

        let missed = next - next_unseen;
        st.lost_samples += missed;

        let sub = st.subscriber_mut(id)?;
        sub.last_seen = Some(next);
        sub.last_delivered_us = now;

        Ok(CopyReport {
            generation: next,
            missed,
        })
    }

    /// Whether a copy would deliver something right now.
    pub fn check(&self, id: SubscriberId) -> Result<bool> {
        let st = self.state.lock().unwrap();
        let head = self.generation.load(Ordering::Relaxed);
        let sub = st.subscriber(id)?;
        Ok(Self::appears_updated(sub, head))
    }

    /// Resize the ring. Only possible before the first publish.
    pub fn set_queue_size(&self, queue_size: usize) -> Result<()> {
        if queue_size < 1 || queue_size > MAX_QUEUE_SIZE {
            return Err(OrbitError::invalid_parameter(
                "queue_size",
                format!("queue size must be in [1, {}]", MAX_QUEUE_SIZE),
            ));
        }

        let mut st = self.state.lock().unwrap();
        if st.queue_locked || self.generation.load(Ordering::Relaxed) > 0 {
            return Err(OrbitError::already_started(&self.meta.name));
        }

        st.queue_size = queue_size;
        st.slots = vec![0u8; queue_size * self.meta.payload_size];
        Ok(())
    }

    /// Set the minimum delivery spacing for one subscriber, microseconds.
    pub fn set_interval(&self, id: SubscriberId, interval_us: u32) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        st.subscriber_mut(id)?.interval_us = interval_us;
        Ok(())
    }

    /// Current delivery spacing for one subscriber, microseconds.
    pub fn get_interval(&self, id: SubscriberId) -> Result<u32> {
        let st = self.state.lock().unwrap();
        Ok(st.subscriber(id)?.interval_us)
    }

    /// Establish or tear down a poll registration.
    ///
    /// On setup the waiter is cleared, stored, and immediately notified when
    /// the subscriber already has something readable, so no publication can
    /// slip between registration and sleep.
    pub fn poll(&self, id: SubscriberId, waiter: &Arc<PollWaiter>, setup: bool) -> Result<()> {
        let mut st = self.state.lock().unwrap();

        if setup {
            st.subscriber(id)?;
            waiter.reset();
            st.pollset.store(waiter)?;

            let head = self.generation.load(Ordering::Relaxed);
            let mut ready = PollEvents::WRITABLE;
            if Self::appears_updated(st.subscriber(id)?, head) {
                ready |= PollEvents::READABLE;
            }
            waiter.notify(ready);
        } else {
            st.pollset.remove(waiter);
        }

        Ok(())
    }

    /// Record a remote subscription; the current sample, if any, is pushed
    /// outward immediately so the new peer starts from the latest value.
    pub fn add_remote_subscriber(&self) {
        let outbound = {
            let mut st = self.state.lock().unwrap();
            st.remote_subscribers += 1;

            let head = self.generation.load(Ordering::Relaxed);
            match (&st.remote_channel, head) {
                (Some(channel), head) if head > 0 => {
                    let slot = ((head - 1) % st.queue_size as u64) as usize;
                    let size = self.meta.payload_size;
                    let sample = st.slots[slot * size..(slot + 1) * size].to_vec();
                    Some((Arc::clone(channel), sample))
                }
                _ => None,
            }
        };

        if let Some((channel, sample)) = outbound {
            if let Err(e) = channel.send_sample(&self.meta.name, &sample) {
                log::warn!("initial remote sample of {} failed: {}", self.meta.name, e);
            }
        }
    }

    /// Drop a remote subscription.
    pub fn remove_remote_subscriber(&self) {
        let mut st = self.state.lock().unwrap();
        st.remote_subscribers = st.remote_subscribers.saturating_sub(1);
    }

    /// Publish a sample injected by the remote side. No local advertiser is
    /// required.
    pub fn publish_remote(&self, data: &[u8]) -> Result<()> {
        {
            let mut st = self.state.lock().unwrap();
            st.remote_publisher_seen = true;
        }
        self.publish(data)
    }

    pub(crate) fn set_remote_channel(&self, channel: Arc<dyn RemoteChannel>) {
        let mut st = self.state.lock().unwrap();
        st.remote_channel = Some(channel);
    }

    fn appears_updated(sub: &SubscriberState, head: u64) -> bool {
        let unseen = match sub.last_seen {
            None => head > 0,
            Some(g) => head > g,
        };
        if !unseen {
            return false;
        }

        sub.interval_us == 0
            || sub.last_delivered_us == 0
            || monotonic_us().saturating_sub(sub.last_delivered_us) >= sub.interval_us as u64
    }

    fn open_first(&self) {
        log::debug!("{}: first open", self.path);
    }

    fn close_last(&self) {
        log::debug!("{}: last close", self.path);
    }
}
