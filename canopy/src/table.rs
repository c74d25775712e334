//! Bounded node liveness table.
//!
//! The collector's canonical state: one row per reporting node, stored in a
//! fixed-capacity arena of slots. Capacity is allocated once at
//! construction; upserts into a full table fail rather than grow it, and
//! eviction is a single O(capacity) scan per tick. Rows are keyed by
//! [`NodeId`] and stamped with the tick of their last update.

use std::net::Ipv6Addr;

use thiserror::Error;

use crate::net::Endpoint;
use crate::tick::{TickInstant, TickSpan};
use crate::wire::NodeId;

/// Default number of table slots.
pub const DEFAULT_CAPACITY: usize = 10;

/// One tracked node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRecord {
    /// The node's identity.
    pub node: NodeId,
    /// Source endpoint of the node's most recent frame (reply target).
    pub endpoint: Endpoint,
    /// Last reported preferred routing parent, if any.
    pub parent: Option<Ipv6Addr>,
    /// Most recent reading, if the node has sent one.
    pub last_reading: Option<u32>,
    /// Number of updates applied for this node since it was inserted.
    pub updates: u64,
    /// Tick of the most recent update.
    pub last_update: TickInstant,
}

/// Errors from table mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TableError {
    /// Every slot is occupied by a live node.
    #[error("node table full ({capacity} slots), dropping node {node}")]
    Full {
        /// The node that could not be inserted.
        node: NodeId,
        /// Configured slot count.
        capacity: usize,
    },
}

/// Fixed-capacity node table.
pub struct NodeTable {
    slots: Vec<Option<NodeRecord>>,
}

impl NodeTable {
    /// Creates a table with the given number of slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "node table capacity must be > 0");
        Self {
            slots: vec![None; capacity],
        }
    }

    /// Returns the configured slot count.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of live rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Returns `true` if no node is currently tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Returns the row for `node`, if tracked.
    #[must_use]
    pub fn get(&self, node: NodeId) -> Option<&NodeRecord> {
        self.slots
            .iter()
            .flatten()
            .find(|rec| rec.node == node)
    }

    /// Updates the row for `node`, inserting it on first contact.
    ///
    /// Existing rows keep their parent/reading fields (callers overwrite
    /// what the frame carried); `endpoint` and `last_update` are always
    /// refreshed and the update counter is bumped.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::Full`] when `node` is new and every slot is
    /// occupied. The caller logs and drops the update.
    pub fn upsert(
        &mut self,
        node: NodeId,
        endpoint: Endpoint,
        now: TickInstant,
    ) -> Result<&mut NodeRecord, TableError> {
        if let Some(i) = self
            .slots
            .iter()
            .position(|s| matches!(s, Some(rec) if rec.node == node))
        {
            let rec = self.slots[i].as_mut().expect("slot checked occupied");
            rec.endpoint = endpoint;
            rec.updates += 1;
            rec.last_update = now;
            return Ok(rec);
        }

        match self.slots.iter().position(Option::is_none) {
            Some(i) => {
                self.slots[i] = Some(NodeRecord {
                    node,
                    endpoint,
                    parent: None,
                    last_reading: None,
                    updates: 1,
                    last_update: now,
                });
                Ok(self.slots[i].as_mut().expect("slot just filled"))
            }
            None => Err(TableError::Full {
                node,
                capacity: self.slots.len(),
            }),
        }
    }

    /// Evicts rows whose last update is at least `timeout` ticks old.
    ///
    /// Calls `on_evict` for each row removed and returns the number of
    /// evictions. Freed slots are immediately reusable.
    pub fn evict_expired(
        &mut self,
        now: TickInstant,
        timeout: TickSpan,
        mut on_evict: impl FnMut(&NodeRecord),
    ) -> usize {
        let mut evicted = 0;
        for slot in &mut self.slots {
            if let Some(rec) = slot {
                if now.since(rec.last_update) >= timeout {
                    on_evict(rec);
                    *slot = None;
                    evicted += 1;
                }
            }
        }
        evicted
    }

    /// Iterates live rows in slot-scan order.
    pub fn iter(&self) -> impl Iterator<Item = &NodeRecord> {
        self.slots.iter().flatten()
    }
}
