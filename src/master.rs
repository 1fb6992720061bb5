//! Device master: the name-to-node index
//!
//! Owns every topic node in the process and resolves runtime paths to them.
//! Node creation goes through the advertise operation, which also allocates
//! free instance numbers. Nodes are never removed; lookups hand out shared
//! references that stay valid after the master lock is released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::MAX_INSTANCES;
use crate::error::{OrbitError, Result};
use crate::meta::{node_path, TopicMeta};
use crate::node::TopicNode;
use crate::remote::RemoteChannel;

#[derive(Debug, Default)]
struct MasterState {
    nodes: HashMap<String, Arc<TopicNode>>,
    /// Handed to every node so publishes can be forwarded outward
    remote_channel: Option<Arc<dyn RemoteChannel>>,
}

/// Process-wide index of topic nodes
#[derive(Debug, Default)]
pub struct DeviceMaster {
    state: Mutex<MasterState>,
}

impl DeviceMaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or allocate the node for an advertise request.
    ///
    /// With `instance == None` the first free instance number is taken.
    /// With an explicit instance, an existing advertiser-less node (e.g.
    /// created by a subscriber that raced ahead) is adopted; a node that
    /// already has an advertiser yields [`OrbitError::Exists`], which the
    /// manager treats as "open the existing node as a second advertiser".
    pub fn advertise(
        &self,
        meta: &TopicMeta,
        instance: Option<usize>,
        priority: i32,
    ) -> Result<(Arc<TopicNode>, usize)> {
        let mut st = self.state.lock().unwrap();

        match instance {
            None => {
                for inst in 0..MAX_INSTANCES {
                    let path = node_path(&meta.name, inst)?;
                    if st.nodes.contains_key(&path) {
                        continue;
                    }
                    let node = self.create_node(&mut st, meta, inst, priority)?;
                    return Ok((node, inst));
                }
                Err(OrbitError::no_mem(format!(
                    "all {} instances of {} are taken",
                    MAX_INSTANCES, meta.name
                )))
            }
            Some(inst) => {
                let path = node_path(&meta.name, inst)?;
                if let Some(existing) = st.nodes.get(&path) {
                    if existing.has_advertiser() {
                        return Err(OrbitError::exists(&meta.name, inst));
                    }
                    return Ok((Arc::clone(existing), inst));
                }
                let node = self.create_node(&mut st, meta, inst, priority)?;
                Ok((node, inst))
            }
        }
    }

    /// Resolve a runtime path to its node.
    pub fn lookup(&self, path: &str) -> Option<Arc<TopicNode>> {
        self.state.lock().unwrap().nodes.get(path).cloned()
    }

    /// Resolve a (topic, instance) pair to its node.
    pub fn lookup_instance(&self, meta: &TopicMeta, instance: usize) -> Option<Arc<TopicNode>> {
        let path = node_path(&meta.name, instance).ok()?;
        self.lookup(&path)
    }

    /// Number of nodes in the index.
    pub fn node_count(&self) -> usize {
        self.state.lock().unwrap().nodes.len()
    }

    /// Attach the remote channel, retrofitting nodes that already exist.
    pub(crate) fn set_remote_channel(&self, channel: Arc<dyn RemoteChannel>) {
        let mut st = self.state.lock().unwrap();
        for node in st.nodes.values() {
            node.set_remote_channel(Arc::clone(&channel));
        }
        st.remote_channel = Some(channel);
    }

    fn create_node(
        &self,
        st: &mut MasterState,
        meta: &TopicMeta,
        instance: usize,
        priority: i32,
    ) -> Result<Arc<TopicNode>> {
        let node = Arc::new(TopicNode::new(
            meta.clone(),
            instance,
            priority,
            st.remote_channel.clone(),
        )?);
        log::debug!("created node {}", node.path());
        st.nodes.insert(node.path().to_string(), Arc::clone(&node));
        Ok(node)
    }
}
