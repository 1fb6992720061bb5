//! Advertiser handles
//!
//! An [`Advertisement`] is the opaque write capability for one topic node.
//! It is minted by the character-device layer, holds its own advertiser
//! registration on the node, and releases it when dropped. A publisher-rule
//! denial produces a sentinel advertisement that carries no node; publishing
//! through it is a silent no-op.

use std::sync::Arc;

use crate::node::TopicNode;

/// Opaque write capability for a topic node
#[derive(Debug)]
pub struct Advertisement {
    node: Option<Arc<TopicNode>>,
    primary: bool,
}

impl Advertisement {
    /// Mint an advertisement, taking a fresh advertiser registration.
    pub(crate) fn new(node: Arc<TopicNode>, primary: bool) -> Self {
        node.retain_advertiser();
        Self {
            node: Some(node),
            primary,
        }
    }

    /// The sentinel returned when a publisher rule denies the advertise.
    pub(crate) fn denied() -> Self {
        Self {
            node: None,
            primary: false,
        }
    }

    /// Whether this is the rule-denied sentinel.
    pub fn is_denied(&self) -> bool {
        self.node.is_none()
    }

    /// Whether this advertisement belongs to the node's first advertiser.
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub(crate) fn node(&self) -> Option<&Arc<TopicNode>> {
        self.node.as_ref()
    }

    /// Name of the advertised topic, if not denied.
    pub fn topic_name(&self) -> Option<&str> {
        self.node.as_deref().map(|n| n.meta().name.as_str())
    }

    /// Instance of the advertised node, if not denied.
    pub fn instance(&self) -> Option<usize> {
        self.node.as_deref().map(TopicNode::instance)
    }
}

impl Drop for Advertisement {
    fn drop(&mut self) {
        if let Some(node) = &self.node {
            node.release_advertiser();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{TopicMeta, PRIORITY_DEFAULT};

    #[test]
    fn test_advertisement_releases_on_drop() {
        let meta = TopicMeta::new("tick", 4);
        let node = Arc::new(TopicNode::new(meta, 0, PRIORITY_DEFAULT, None).unwrap());

        let advert = Advertisement::new(Arc::clone(&node), true);
        assert!(node.has_advertiser());
        assert!(advert.is_primary());
        assert_eq!(advert.topic_name(), Some("tick"));
        assert_eq!(advert.instance(), Some(0));

        drop(advert);
        assert!(!node.has_advertiser());
    }

    #[test]
    fn test_denied_sentinel() {
        let advert = Advertisement::denied();
        assert!(advert.is_denied());
        assert!(!advert.is_primary());
        assert_eq!(advert.topic_name(), None);
        assert_eq!(advert.instance(), None);
    }
}
