//! Compliant consensus node
//!
//! A node in a follow graph that relays every transaction it hears about and
//! stops listening to followees that go silent. Transactions are identified
//! by hash only.

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::crypto::Hash;

/// A transaction proposed by a followee during a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub tx: Hash,
    /// Index of the followee that sent it
    pub sender: usize,
}

impl Candidate {
    pub fn new(tx: Hash, sender: usize) -> Self {
        Self { tx, sender }
    }
}

/// Node that follows the relay rules
#[derive(Debug, Clone, Default)]
pub struct CompliantNode {
    /// `followees[i]` is true if this node listens to node `i`
    followees: Vec<bool>,
    /// Followees that sent nothing in some round. Permanent until followees are reset.
    blacklisted: Vec<bool>,
    pending: HashSet<Hash>,
}

impl CompliantNode {
    /// Create a node in a network of `node_count` nodes, following nobody
    pub fn new(node_count: usize) -> Self {
        Self {
            followees: vec![false; node_count],
            blacklisted: vec![false; node_count],
            pending: HashSet::new(),
        }
    }

    /// Replace the followee set. Clears the blacklist.
    pub fn set_followees(&mut self, followees: &[bool]) {
        self.followees = followees.to_vec();
        self.blacklisted = vec![false; followees.len()];
    }

    /// Seed the node with its initial transactions
    pub fn set_pending_transactions(&mut self, pending: HashSet<Hash>) {
        self.pending = pending;
    }

    /// Transactions this node will relay next
    pub fn pending(&self) -> &HashSet<Hash> {
        &self.pending
    }

    /// Hand every pending transaction to followers and forget them
    pub fn send_to_followers(&mut self) -> HashSet<Hash> {
        std::mem::take(&mut self.pending)
    }

    /// Process one round of candidates.
    ///
    /// Any followee that sent nothing this round is blacklisted first, then
    /// candidates from senders that are not blacklisted become pending.
    /// Candidates from unknown senders are ignored.
    pub fn receive_from_followees(&mut self, candidates: &[Candidate]) {
        let senders: HashSet<usize> = candidates.iter().map(|c| c.sender).collect();

        for (index, follows) in self.followees.iter().enumerate() {
            if *follows && !senders.contains(&index) && !self.blacklisted[index] {
                debug!(followee = index, "blacklisted silent followee");
                self.blacklisted[index] = true;
            }
        }

        for candidate in candidates {
            match self.blacklisted.get(candidate.sender) {
                Some(false) => {
                    self.pending.insert(candidate.tx);
                }
                Some(true) => {}
                None => trace!(sender = candidate.sender, "ignored candidate from unknown node"),
            }
        }
    }

    /// Whether node `index` has been blacklisted
    pub fn is_blacklisted(&self, index: usize) -> bool {
        self.blacklisted.get(index).copied().unwrap_or(false)
    }

    /// Whether this node follows node `index`
    pub fn follows(&self, index: usize) -> bool {
        self.followees.get(index).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash_bytes;

    fn tx(tag: &[u8]) -> Hash {
        hash_bytes(tag)
    }

    #[test]
    fn test_send_clears_pending() {
        let mut node = CompliantNode::new(3);
        node.set_pending_transactions([tx(b"a"), tx(b"b")].into_iter().collect());

        let sent = node.send_to_followers();
        assert_eq!(sent.len(), 2);
        assert!(node.pending().is_empty());
        assert!(node.send_to_followers().is_empty());
    }

    #[test]
    fn test_silent_followee_blacklisted() {
        let mut node = CompliantNode::new(3);
        node.set_followees(&[true, true, false]);

        node.receive_from_followees(&[Candidate::new(tx(b"a"), 0)]);
        assert!(!node.is_blacklisted(0));
        assert!(node.is_blacklisted(1));
        assert!(!node.is_blacklisted(2));
        assert!(node.pending().contains(&tx(b"a")));
    }

    #[test]
    fn test_blacklisted_candidates_dropped() {
        let mut node = CompliantNode::new(2);
        node.set_followees(&[true, true]);

        node.receive_from_followees(&[Candidate::new(tx(b"a"), 0)]);
        node.receive_from_followees(&[
            Candidate::new(tx(b"b"), 0),
            Candidate::new(tx(b"c"), 1),
        ]);

        assert!(node.is_blacklisted(1));
        assert!(node.pending().contains(&tx(b"b")));
        assert!(!node.pending().contains(&tx(b"c")));
    }

    #[test]
    fn test_non_followee_candidates_accepted() {
        let mut node = CompliantNode::new(2);
        node.set_followees(&[true, false]);
        node.receive_from_followees(&[
            Candidate::new(tx(b"a"), 0),
            Candidate::new(tx(b"b"), 1),
        ]);
        assert_eq!(node.pending().len(), 2);
    }

    #[test]
    fn test_unknown_sender_ignored() {
        let mut node = CompliantNode::new(1);
        node.set_followees(&[true]);
        node.receive_from_followees(&[
            Candidate::new(tx(b"a"), 0),
            Candidate::new(tx(b"b"), 7),
        ]);
        assert_eq!(node.pending().len(), 1);
        assert!(!node.is_blacklisted(7));
    }

    #[test]
    fn test_reset_followees_clears_blacklist() {
        let mut node = CompliantNode::new(1);
        node.set_followees(&[true]);
        node.receive_from_followees(&[]);
        assert!(node.is_blacklisted(0));

        node.set_followees(&[true]);
        assert!(!node.is_blacklisted(0));
    }
}
