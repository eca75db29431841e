//! Breadth-first work queue with deduplication.

use bitcoin::p2p::address::AddrV2;
use peermap_connection::PeerAddress;
use std::collections::{HashSet, VecDeque};

/// Addresses waiting to be visited, plus every host ever seen.
///
/// A host enters the queue at most once per crawl, whatever port or
/// metadata later reports carry. The frontier has exactly one owner, the
/// scheduler's control loop, so each call is atomic with respect to the
/// others.
#[derive(Debug, Default)]
pub struct Frontier {
    seen: HashSet<AddrV2>,
    pending: VecDeque<PeerAddress>,
    dequeued: usize,
}

impl Frontier {
    /// Create an empty frontier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark each address's host as seen, queueing only first sightings.
    ///
    /// # Returns
    ///
    /// The number of addresses newly queued.
    pub fn mark_and_enqueue<I>(&mut self, addresses: I) -> usize
    where
        I: IntoIterator<Item = PeerAddress>,
    {
        let mut queued = 0;
        for address in addresses {
            if self.seen.insert(address.host.clone()) {
                self.pending.push_back(address);
                queued += 1;
            }
        }
        queued
    }

    /// Pop the oldest pending address.
    pub fn dequeue(&mut self) -> Option<PeerAddress> {
        let next = self.pending.pop_front();
        if next.is_some() {
            self.dequeued += 1;
        }
        next
    }

    /// Distinct hosts ever marked.
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Addresses queued and not yet dequeued.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Addresses handed out by [`Frontier::dequeue`] so far.
    pub fn dequeued_count(&self) -> usize {
        self.dequeued
    }

    #[cfg(test)]
    fn is_seen(&self, host: &AddrV2) -> bool {
        self.seen.contains(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn address(last_octet: u8, port: u16) -> PeerAddress {
        PeerAddress::new(AddrV2::Ipv4(Ipv4Addr::new(10, 0, 0, last_octet)), port)
    }

    #[test]
    fn test_fifo_order() {
        let mut frontier = Frontier::new();
        frontier.mark_and_enqueue([address(1, 8333), address(2, 8333)]);
        frontier.mark_and_enqueue([address(3, 8333)]);

        let order: Vec<_> = std::iter::from_fn(|| frontier.dequeue())
            .map(|peer| peer.host)
            .collect();
        assert_eq!(
            order,
            vec![
                address(1, 8333).host,
                address(2, 8333).host,
                address(3, 8333).host
            ]
        );
        assert_eq!(frontier.dequeued_count(), 3);
        assert!(frontier.dequeue().is_none());
        assert_eq!(frontier.dequeued_count(), 3);
    }

    #[test]
    fn test_host_is_identity() {
        let mut frontier = Frontier::new();
        assert_eq!(frontier.mark_and_enqueue([address(1, 8333)]), 1);
        // Same host on another port is not a new peer.
        assert_eq!(frontier.mark_and_enqueue([address(1, 18333)]), 0);
        // Duplicates inside one batch.
        assert_eq!(
            frontier.mark_and_enqueue([address(2, 8333), address(2, 8333)]),
            1
        );
        assert_eq!(frontier.seen_count(), 2);
        assert_eq!(frontier.pending_count(), 2);
    }

    #[test]
    fn test_seen_outlives_dequeue() {
        let mut frontier = Frontier::new();
        frontier.mark_and_enqueue([address(1, 8333)]);
        frontier.dequeue();

        assert_eq!(frontier.mark_and_enqueue([address(1, 8333)]), 0);
        assert!(frontier.is_seen(&address(1, 8333).host));
        assert_eq!(frontier.pending_count(), 0);
    }
}
