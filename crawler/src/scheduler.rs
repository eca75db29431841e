//! The crawl's control loop.
//!
//! The [`Scheduler`] owns the [`Frontier`] and drives [`PeerSession`]s from it
//! under a concurrency bound. Finished sessions come back to the loop, which
//! alone feeds their addresses into the frontier and the [`Aggregator`].

use crate::aggregator::{AddressPolicy, Aggregator};
use crate::connection::Connector;
use crate::frontier::Frontier;
use crate::session::{PeerSession, SessionReport, SessionState};
use log::{debug, info, warn};
use peermap_connection::{ConnectionConfiguration, PeerAddress};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};

/// Default number of sessions in flight.
pub const DEFAULT_CONCURRENCY: usize = 300;
/// Default number of distinct hosts after which the crawl stops.
pub const DEFAULT_TARGET: usize = 1000;
/// Default time budget of a single session.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30);
/// Default time budget of the whole crawl.
pub const DEFAULT_GLOBAL_TIMEOUT: Duration = Duration::from_secs(600);

const PROGRESS_INTERVAL: Duration = Duration::from_secs(60);

/// Scheduling limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum sessions in flight.
    pub concurrency: usize,
    /// Stop once this many distinct hosts have been seen.
    pub target: usize,
    pub session_timeout: Duration,
    pub global_timeout: Duration,
    /// Pause after every refill pass which started sessions. Zero disables it.
    pub batch_delay: Duration,
    /// Hosts the policy rejects stay seen but are never dialed.
    pub policy: AddressPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            concurrency: DEFAULT_CONCURRENCY,
            target: DEFAULT_TARGET,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            global_timeout: DEFAULT_GLOBAL_TIMEOUT,
            batch_delay: Duration::ZERO,
            policy: AddressPolicy::All,
        }
    }
}

/// Why a crawl ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Enough distinct hosts were seen.
    TargetReached,
    /// Nothing left to visit and nothing in flight.
    Exhausted,
    /// The global time budget ran out.
    DeadlineExceeded,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::TargetReached => write!(f, "target reached"),
            StopReason::Exhausted => write!(f, "frontier exhausted"),
            StopReason::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Session outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStats {
    /// Sessions which completed the version handshake and were not dropped
    /// afterwards for misbehaving.
    pub handshakes: usize,
    /// Sessions which failed, including panicked session tasks.
    pub failures: usize,
    /// Sessions which hit their deadline.
    pub timeouts: usize,
    /// Sessions still in flight when the crawl stopped.
    pub abandoned: usize,
    /// Dequeued hosts the address policy kept us from dialing.
    #[serde(default)]
    pub skipped: usize,
}

impl CrawlStats {
    fn record(&mut self, report: &SessionReport) {
        if report.completed_handshake() {
            self.handshakes += 1;
        }
        match report.state {
            SessionState::Failed => self.failures += 1,
            SessionState::TimedOut => self.timeouts += 1,
            _ => {}
        }
    }
}

/// Bookkeeping of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlOutcome {
    pub stop_reason: StopReason,
    pub stats: CrawlStats,
    /// Distinct hosts marked seen.
    pub total_discovered: usize,
    /// Sessions which reached a terminal state.
    pub total_visited: usize,
    /// Addresses taken off the frontier.
    pub dequeued: usize,
}

/// Drains a frontier through peer sessions.
#[derive(Debug)]
pub struct Scheduler<C: Connector> {
    connector: C,
    connection: Arc<ConnectionConfiguration>,
    config: SchedulerConfig,
}

impl<C: Connector> Scheduler<C> {
    pub fn new(connector: C, connection: ConnectionConfiguration, config: SchedulerConfig) -> Self {
        Scheduler {
            connector,
            connection: Arc::new(connection),
            config,
        }
    }

    /// Crawl outwards from `seeds` until the target is reached, the frontier
    /// runs dry, or the global deadline passes.
    ///
    /// Seeds and every session's discoveries are reported to `aggregator` in
    /// processing order. Sessions still in flight at the end are aborted.
    pub async fn run(&self, seeds: Vec<PeerAddress>, aggregator: &mut Aggregator) -> CrawlOutcome {
        let deadline = Instant::now() + self.config.global_timeout;
        let concurrency = self.config.concurrency.max(1);

        let mut frontier = Frontier::new();
        aggregator.observe(&seeds);
        frontier.mark_and_enqueue(seeds);

        let mut in_flight: JoinSet<SessionReport> = JoinSet::new();
        let mut stats = CrawlStats::default();
        let mut visited = 0;
        let mut last_progress = Instant::now();

        let stop_reason = loop {
            if Instant::now() >= deadline {
                break StopReason::DeadlineExceeded;
            }
            if frontier.seen_count() >= self.config.target {
                break StopReason::TargetReached;
            }

            let mut spawned = 0;
            while in_flight.len() < concurrency {
                let Some(target) = frontier.dequeue() else {
                    break;
                };
                if !self.config.policy.may_dial(&target.host) {
                    debug!("Not dialing {target}, excluded by the address policy");
                    stats.skipped += 1;
                    continue;
                }
                let session = PeerSession::new(target, self.config.session_timeout);
                let connector = self.connector.clone();
                let connection = self.connection.clone();
                in_flight.spawn(async move { session.run(&connector, &connection).await });
                spawned += 1;
            }
            if in_flight.is_empty() {
                break StopReason::Exhausted;
            }

            if spawned > 0 && !self.config.batch_delay.is_zero() {
                sleep_until((Instant::now() + self.config.batch_delay).min(deadline)).await;
            }

            tokio::select! {
                _ = sleep_until(deadline) => {}
                joined = in_flight.join_next() => match joined {
                    Some(Ok(report)) => {
                        debug!(
                            "Session with {} ended {} with {} addresses",
                            report.target,
                            report.state,
                            report.discovered.len()
                        );
                        stats.record(&report);
                        aggregator.observe_report(&report);
                        frontier.mark_and_enqueue(report.discovered);
                        visited += 1;
                    }
                    Some(Err(e)) => {
                        warn!("Session task did not finish cleanly: {e}");
                        stats.failures += 1;
                        visited += 1;
                    }
                    None => {}
                },
            }

            if last_progress.elapsed() >= PROGRESS_INTERVAL {
                info!(
                    "Crawl progress: {} in flight, {} seen, {} visited, {} pending",
                    in_flight.len(),
                    frontier.seen_count(),
                    visited,
                    frontier.pending_count()
                );
                last_progress = Instant::now();
            }
        };

        stats.abandoned = in_flight.len();
        in_flight.abort_all();

        info!(
            "Crawl stopped ({stop_reason}): {} seen, {visited} visited, {} abandoned",
            frontier.seen_count(),
            stats.abandoned
        );

        CrawlOutcome {
            stop_reason,
            stats,
            total_discovered: frontier.seen_count(),
            total_visited: visited,
            dequeued: frontier.dequeued_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::CrawlResult;
    use crate::connection::test_utils::*;
    use bitcoin::p2p::address::AddrV2;
    use bitcoin::Network;
    use peermap_connection::wire::Message;

    fn scheduler(connector: MockConnector, config: SchedulerConfig) -> Scheduler<MockConnector> {
        let connection = ConnectionConfiguration::non_listening(Network::Bitcoin, 70016, None);
        Scheduler::new(connector, connection, config)
    }

    fn config(concurrency: usize, target: usize) -> SchedulerConfig {
        SchedulerConfig {
            concurrency,
            target,
            ..SchedulerConfig::default()
        }
    }

    fn aggregator() -> Aggregator {
        Aggregator::new(Network::Bitcoin, AddressPolicy::All)
    }

    fn build(aggregator: &Aggregator, outcome: &CrawlOutcome) -> CrawlResult {
        aggregator.build(
            outcome.total_discovered,
            outcome.total_visited,
            outcome.stop_reason,
            outcome.stats,
        )
    }

    fn result_hosts(aggregator: &Aggregator, outcome: &CrawlOutcome) -> Vec<String> {
        build(aggregator, outcome).nodes.into_keys().collect()
    }

    #[tokio::test]
    async fn test_two_seed_scenario() {
        let connector = MockConnector::new();
        connector.add(
            ipv4(10, 0, 0, 1),
            Script::serving(&[ipv4(10, 0, 0, 3), ipv4(10, 0, 0, 4)]),
        );
        connector.add(
            ipv4(10, 0, 0, 2),
            Script::serving(&[ipv4(10, 0, 0, 3), ipv4(10, 0, 0, 5)]),
        );

        let mut aggregator = aggregator();
        let outcome = scheduler(connector, config(10, 5))
            .run(
                vec![peer(ipv4(10, 0, 0, 1)), peer(ipv4(10, 0, 0, 2))],
                &mut aggregator,
            )
            .await;

        assert_eq!(outcome.stop_reason, StopReason::TargetReached);
        assert_eq!(outcome.total_discovered, 5);
        assert_eq!(
            result_hosts(&aggregator, &outcome),
            vec![
                "10.0.0.1:8333",
                "10.0.0.2:8333",
                "10.0.0.3:8333",
                "10.0.0.4:8333",
                "10.0.0.5:8333"
            ]
        );
    }

    #[tokio::test]
    async fn test_host_reported_twice_is_visited_once() {
        let connector = MockConnector::new();
        connector.add(ipv4(10, 0, 0, 1), Script::serving(&[ipv4(10, 0, 0, 3), ipv4(10, 0, 0, 4)]));
        connector.add(ipv4(10, 0, 0, 2), Script::serving(&[ipv4(10, 0, 0, 3), ipv4(10, 0, 0, 5)]));
        connector.add(ipv4(10, 0, 0, 3), Script::serving(&[ipv4(10, 0, 0, 1), ipv4(10, 0, 0, 2)]));

        let mut aggregator = aggregator();
        let outcome = scheduler(connector.clone(), config(10, 1000))
            .run(
                vec![peer(ipv4(10, 0, 0, 1)), peer(ipv4(10, 0, 0, 2))],
                &mut aggregator,
            )
            .await;

        assert_eq!(outcome.stop_reason, StopReason::Exhausted);
        let connects = connector.connects();
        assert_eq!(connects.len(), 5);
        let visits_to_3 = connects.iter().filter(|h| **h == ipv4(10, 0, 0, 3)).count();
        assert_eq!(visits_to_3, 1);
        assert_eq!(outcome.total_visited, 5);
        assert!(outcome.total_visited <= outcome.dequeued);
    }

    #[tokio::test]
    async fn test_exhausts_before_target() {
        // A chain of 40 hosts, each pointing at the next one.
        let connector = MockConnector::new();
        for i in 1..=40u8 {
            let next = if i < 40 {
                vec![ipv4(10, 0, 1, i + 1), ipv4(10, 0, 1, 1)]
            } else {
                Vec::new()
            };
            connector.add(ipv4(10, 0, 1, i), Script::serving(&next));
        }

        let mut aggregator = aggregator();
        let outcome = scheduler(connector, config(8, 1000))
            .run(vec![peer(ipv4(10, 0, 1, 1))], &mut aggregator)
            .await;

        assert_eq!(outcome.stop_reason, StopReason::Exhausted);
        assert_eq!(outcome.total_discovered, 40);
        assert_eq!(outcome.total_visited, 40);
        assert_eq!(outcome.stats.handshakes, 40);
        assert_eq!(result_hosts(&aggregator, &outcome).len(), 40);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bound() {
        let connector = MockConnector::new();
        let mut seeds = Vec::new();
        for i in 1..=20u8 {
            let mut steps = vec![Step::Delay(Duration::from_secs(1))];
            steps.extend(handshake_steps());
            steps.push(Step::Send(addr_message(&[ipv4(10, 0, 2, i), ipv4(10, 0, 3, i)])));
            connector.add(ipv4(10, 0, 0, i), Script::new(steps, Exhausted::Close));
            seeds.push(peer(ipv4(10, 0, 0, i)));
        }

        let mut aggregator = aggregator();
        let outcome = scheduler(connector.clone(), config(3, 1000))
            .run(seeds, &mut aggregator)
            .await;

        assert_eq!(outcome.stop_reason, StopReason::Exhausted);
        assert!(connector.max_active() <= 3);
        assert!(connector.max_active() > 0);
        // The 40 gossiped hosts refuse connections.
        assert_eq!(outcome.total_visited, 60);
        assert_eq!(outcome.stats.failures, 40);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_respects_deadlines() {
        let connector = MockConnector::new();
        connector.add(ipv4(10, 0, 0, 1), Script::silent());
        connector.add(ipv4(10, 0, 0, 2), Script::serving(&[ipv4(10, 0, 0, 3), ipv4(10, 0, 0, 4)]));

        let config = SchedulerConfig {
            session_timeout: Duration::from_secs(30),
            global_timeout: Duration::from_secs(20),
            ..config(10, 1000)
        };

        let started = Instant::now();
        let mut aggregator = aggregator();
        let outcome = scheduler(connector, config)
            .run(
                vec![peer(ipv4(10, 0, 0, 1)), peer(ipv4(10, 0, 0, 2))],
                &mut aggregator,
            )
            .await;

        assert!(started.elapsed() <= Duration::from_secs(50));
        assert_eq!(outcome.stop_reason, StopReason::DeadlineExceeded);
        assert_eq!(outcome.stats.abandoned, 1);
        assert_eq!(outcome.total_discovered, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_times_out() {
        let connector = MockConnector::new();
        connector.add(ipv4(10, 0, 0, 1), Script::silent());

        let config = SchedulerConfig {
            session_timeout: Duration::from_secs(5),
            ..config(10, 1000)
        };
        let mut aggregator = aggregator();
        let outcome = scheduler(connector, config)
            .run(vec![peer(ipv4(10, 0, 0, 1))], &mut aggregator)
            .await;

        assert_eq!(outcome.stop_reason, StopReason::Exhausted);
        assert_eq!(outcome.stats.timeouts, 1);
        assert_eq!(outcome.stats.handshakes, 1);
        assert_eq!(outcome.total_visited, 1);
    }

    #[tokio::test]
    async fn test_malformed_addr_contributes_nothing() {
        let connector = MockConnector::new();
        let mut steps = handshake_steps();
        steps.push(Step::Send(addr_message(&[ipv4(10, 0, 0, 8)])));
        steps.push(Step::Corrupt);
        connector.add(ipv4(10, 0, 0, 1), Script::new(steps, Exhausted::Close));

        let mut aggregator = aggregator();
        let outcome = scheduler(connector, config(10, 1000))
            .run(vec![peer(ipv4(10, 0, 0, 1))], &mut aggregator)
            .await;

        assert_eq!(outcome.total_discovered, 1);
        assert_eq!(outcome.stats.failures, 1);
        assert_eq!(outcome.stats.handshakes, 0);

        // The dropped peer's own version message is not trusted either.
        let result = build(&aggregator, &outcome);
        assert_eq!(result.nodes.keys().collect::<Vec<_>>(), vec!["10.0.0.1:8333"]);
        let node = &result.nodes["10.0.0.1:8333"];
        assert_eq!(node.version, "unknown");
        assert_eq!(node.services, None);
        assert_eq!(node.user_agent, None);
        assert_eq!(node.start_height, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_version_without_verack_is_not_a_handshake() {
        let connector = MockConnector::new();
        connector.add(
            ipv4(10, 0, 0, 1),
            Script::new(
                vec![Step::Send(Message::Version(peer_version(9)))],
                Exhausted::Hang,
            ),
        );

        let config = SchedulerConfig {
            session_timeout: Duration::from_secs(5),
            ..config(10, 1000)
        };
        let mut aggregator = aggregator();
        let outcome = scheduler(connector, config)
            .run(vec![peer(ipv4(10, 0, 0, 1))], &mut aggregator)
            .await;

        assert_eq!(outcome.stats.timeouts, 1);
        assert_eq!(outcome.stats.handshakes, 0);
        let result = build(&aggregator, &outcome);
        assert_eq!(result.nodes["10.0.0.1:8333"].version, "unknown");
    }

    #[tokio::test]
    async fn test_public_only_never_dials_local_hosts() {
        let public = ipv4(8, 8, 8, 8);
        let connector = MockConnector::new();
        connector.add(
            public.clone(),
            Script::serving(&[ipv4(127, 0, 0, 1), ipv4(192, 168, 1, 1)]),
        );
        connector.add(
            ipv4(127, 0, 0, 1),
            Script::serving(&[ipv4(10, 0, 0, 1), ipv4(10, 0, 0, 2)]),
        );
        connector.add(
            ipv4(192, 168, 1, 1),
            Script::serving(&[ipv4(10, 0, 0, 3), ipv4(10, 0, 0, 4)]),
        );

        let config = SchedulerConfig {
            policy: AddressPolicy::PublicOnly,
            ..config(10, 1000)
        };
        let mut aggregator = Aggregator::new(Network::Bitcoin, AddressPolicy::PublicOnly);
        let outcome = scheduler(connector.clone(), config)
            .run(vec![peer(public)], &mut aggregator)
            .await;

        assert_eq!(outcome.stop_reason, StopReason::Exhausted);
        assert_eq!(connector.connects(), vec![ipv4(8, 8, 8, 8)]);
        // The skipped hosts are still seen, just never visited.
        assert_eq!(outcome.total_discovered, 3);
        assert_eq!(outcome.total_visited, 1);
        assert_eq!(outcome.dequeued, 3);
        assert_eq!(outcome.stats.skipped, 2);
        assert_eq!(result_hosts(&aggregator, &outcome), vec!["8.8.8.8:8333"]);
    }

    #[tokio::test]
    async fn test_breadth_first_order() {
        let a = ipv4(10, 0, 0, 1);
        let b = ipv4(10, 0, 0, 2);
        let a_children = [ipv4(10, 1, 0, 1), ipv4(10, 1, 0, 2)];
        let b_children = [ipv4(10, 2, 0, 1), ipv4(10, 2, 0, 2)];

        let connector = MockConnector::new();
        connector.add(a.clone(), Script::serving(&a_children));
        connector.add(b.clone(), Script::serving(&b_children));
        for (i, child) in a_children.iter().chain(b_children.iter()).enumerate() {
            let grandchildren = [ipv4(10, 9, i as u8, 1), ipv4(10, 9, i as u8, 2)];
            connector.add(child.clone(), Script::serving(&grandchildren));
        }

        let mut aggregator = aggregator();
        scheduler(connector.clone(), config(2, 1000))
            .run(vec![peer(a), peer(b)], &mut aggregator)
            .await;

        let connects = connector.connects();
        let last_child = connects
            .iter()
            .rposition(|host| a_children.contains(host) || b_children.contains(host))
            .unwrap();
        let first_grandchild = connects
            .iter()
            .position(|host| matches!(host, AddrV2::Ipv4(ip) if ip.octets()[1] == 9))
            .unwrap();
        assert!(last_child < first_grandchild);
    }

    #[tokio::test]
    async fn test_anonymizing_host_seen_but_not_reported() {
        let onion = AddrV2::TorV3([3; 32]);
        let connector = MockConnector::new();
        connector.add(
            ipv4(10, 0, 0, 1),
            Script::serving(&[ipv4(10, 0, 0, 2), onion.clone()]),
        );
        connector.add(ipv4(10, 0, 0, 2), Script::serving(&[onion.clone(), ipv4(10, 0, 0, 1)]));

        let mut aggregator = aggregator();
        let outcome = scheduler(connector.clone(), config(10, 1000))
            .run(vec![peer(ipv4(10, 0, 0, 1))], &mut aggregator)
            .await;

        assert_eq!(outcome.total_discovered, 3);
        assert_eq!(connector.connects().iter().filter(|h| **h == onion).count(), 1);
        assert_eq!(
            result_hosts(&aggregator, &outcome),
            vec!["10.0.0.1:8333", "10.0.0.2:8333"]
        );
    }

    #[tokio::test]
    async fn test_target_checked_before_visiting() {
        let connector = MockConnector::new();
        let mut aggregator = aggregator();
        let outcome = scheduler(connector.clone(), config(10, 2))
            .run(
                vec![peer(ipv4(10, 0, 0, 1)), peer(ipv4(10, 0, 0, 2))],
                &mut aggregator,
            )
            .await;

        assert_eq!(outcome.stop_reason, StopReason::TargetReached);
        assert!(connector.connects().is_empty());
        assert_eq!(outcome.total_visited, 0);
    }

    #[tokio::test]
    async fn test_no_seeds_is_exhausted() {
        let mut aggregator = aggregator();
        let outcome = scheduler(MockConnector::new(), config(10, 1000))
            .run(Vec::new(), &mut aggregator)
            .await;
        assert_eq!(outcome.stop_reason, StopReason::Exhausted);
        assert_eq!(outcome.total_visited, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_delay_pauses_refills() {
        let connector = MockConnector::new();
        connector.add(ipv4(10, 0, 0, 1), Script::serving(&[ipv4(10, 0, 0, 2), ipv4(10, 0, 0, 3)]));

        let config = SchedulerConfig {
            batch_delay: Duration::from_secs(2),
            ..config(10, 1000)
        };
        let started = Instant::now();
        let mut aggregator = aggregator();
        let outcome = scheduler(connector, config)
            .run(vec![peer(ipv4(10, 0, 0, 1))], &mut aggregator)
            .await;

        // One pass for the seed, one for its two neighbours.
        assert!(started.elapsed() >= Duration::from_secs(4));
        assert_eq!(outcome.total_visited, 3);
    }
}
