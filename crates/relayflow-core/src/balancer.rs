//! SMTP relay load balancer
//!
//! Relays are partitioned by priority and tried highest group first;
//! inside a group a process-local rotation index round-robins the
//! members. A candidate is accepted only while its hourly (and, when
//! capped, daily) fan-out counters are under the relay's limits.
//! Selection never mutates counters; accounting happens after a
//! successful send, so transient overshoot up to the worker concurrency
//! is possible.

use crate::keys;
use chrono::Local;
use relayflow_common::types::RelayId;
use relayflow_common::Result;
use relayflow_storage::models::SmtpRelay;
use relayflow_storage::{KvStore, SmtpRelayRepository};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

const HOUR_TTL: Duration = Duration::from_secs(2 * 60 * 60);
const DAY_TTL: Duration = Duration::from_secs(48 * 60 * 60);

/// Weighted relay selector with hour/day cap gating
pub struct LoadBalancer {
    relays: Arc<dyn SmtpRelayRepository>,
    kv: Arc<dyn KvStore>,
    rotation: Mutex<HashMap<i32, usize>>,
}

/// Partition relays into priority groups, highest priority first.
/// Input is expected to be ordered by priority descending already.
fn group_by_priority(relays: Vec<SmtpRelay>) -> Vec<(i32, Vec<SmtpRelay>)> {
    let mut groups: Vec<(i32, Vec<SmtpRelay>)> = Vec::new();
    for relay in relays {
        match groups.last_mut() {
            Some((priority, group)) if *priority == relay.priority => group.push(relay),
            _ => groups.push((relay.priority, vec![relay])),
        }
    }
    groups
}

impl LoadBalancer {
    pub fn new(relays: Arc<dyn SmtpRelayRepository>, kv: Arc<dyn KvStore>) -> Self {
        Self {
            relays,
            kv,
            rotation: Mutex::new(HashMap::new()),
        }
    }

    /// Pick the next relay with remaining capacity, or `None` when every
    /// active relay is exhausted
    pub async fn select(&self) -> Result<Option<SmtpRelay>> {
        let active = self.relays.list_active().await?;
        if active.is_empty() {
            return Ok(None);
        }

        for (priority, group) in group_by_priority(active) {
            for _ in 0..group.len() {
                let idx = self.next_index(priority, group.len());
                let candidate = &group[idx];
                if self.has_capacity(candidate).await? {
                    debug!(relay_id = candidate.id, priority, "Relay selected");
                    return Ok(Some(candidate.clone()));
                }
            }
        }

        Ok(None)
    }

    fn next_index(&self, priority: i32, group_len: usize) -> usize {
        let mut rotation = self.rotation.lock().unwrap();
        let counter = rotation.entry(priority).or_insert(0);
        let idx = *counter % group_len;
        *counter = counter.wrapping_add(1);
        idx
    }

    async fn has_capacity(&self, relay: &SmtpRelay) -> Result<bool> {
        let now = Local::now();

        let hour_count = self
            .kv
            .get_i64(&keys::smtp_hour(relay.id, now))
            .await?
            .unwrap_or(0);
        if hour_count >= relay.max_per_hour {
            return Ok(false);
        }

        if relay.max_per_day > 0 {
            let day_count = self
                .kv
                .get_i64(&keys::smtp_day(relay.id, now.date_naive()))
                .await?
                .unwrap_or(0);
            if day_count >= relay.max_per_day {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Account one accepted message against the relay's counters
    pub async fn on_send_success(&self, relay_id: RelayId) -> Result<()> {
        let now = Local::now();
        self.kv
            .incr(&keys::smtp_hour(relay_id, now), Some(HOUR_TTL))
            .await?;
        self.kv
            .incr(&keys::smtp_day(relay_id, now.date_naive()), Some(DAY_TTL))
            .await?;
        Ok(())
    }

    /// Current hour and day counter values for a relay
    pub async fn current_usage(&self, relay_id: RelayId) -> Result<(i64, i64)> {
        let now = Local::now();
        let hour = self
            .kv
            .get_i64(&keys::smtp_hour(relay_id, now))
            .await?
            .unwrap_or(0);
        let day = self
            .kv
            .get_i64(&keys::smtp_day(relay_id, now.date_naive()))
            .await?
            .unwrap_or(0);
        Ok((hour, day))
    }

    /// Drop the current hour and day counters in one pipelined call
    pub async fn reset_counters(&self, relay_id: RelayId) -> Result<()> {
        let now = Local::now();
        self.kv
            .delete_many(&[
                keys::smtp_hour(relay_id, now),
                keys::smtp_day(relay_id, now.date_naive()),
            ])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{relay_fixture, MemRelayRepo};
    use relayflow_storage::MemoryStore;

    fn balancer_with(
        relays: Vec<SmtpRelay>,
    ) -> (LoadBalancer, Arc<MemoryStore>) {
        let kv = Arc::new(MemoryStore::new());
        let repo = Arc::new(MemRelayRepo::new(relays));
        (LoadBalancer::new(repo, kv.clone()), kv)
    }

    #[test]
    fn grouping_keeps_priority_order() {
        let relays = vec![
            relay_fixture(1, 10, 100),
            relay_fixture(2, 10, 100),
            relay_fixture(3, 5, 100),
        ];
        let groups = group_by_priority(relays);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, 10);
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, 5);
    }

    #[tokio::test]
    async fn round_robin_covers_the_group_exactly_once() {
        let (balancer, _) = balancer_with(vec![
            relay_fixture(1, 10, 100),
            relay_fixture(2, 10, 100),
            relay_fixture(3, 10, 100),
        ]);

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(balancer.select().await.unwrap().unwrap().id);
        }
        seen.sort();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn higher_priority_group_is_preferred_while_it_has_capacity() {
        let (balancer, _) = balancer_with(vec![
            relay_fixture(1, 10, 100),
            relay_fixture(2, 5, 100),
        ]);

        for _ in 0..5 {
            let relay = balancer.select().await.unwrap().unwrap();
            assert_eq!(relay.id, 1);
        }
    }

    #[tokio::test]
    async fn falls_over_to_lower_priority_when_hour_cap_is_hit() {
        // relay 1 (priority 10) already sent its single allowed message
        let (balancer, kv) = balancer_with(vec![
            relay_fixture(1, 10, 1),
            relay_fixture(2, 5, 100),
        ]);
        kv.incr(&keys::smtp_hour(1, Local::now()), None)
            .await
            .unwrap();

        let relay = balancer.select().await.unwrap().unwrap();
        assert_eq!(relay.id, 2);
    }

    #[tokio::test]
    async fn day_cap_of_zero_means_unlimited() {
        let (balancer, kv) = balancer_with(vec![relay_fixture(1, 10, 100)]);
        let now = Local::now();
        for _ in 0..50 {
            kv.incr(&keys::smtp_day(1, now.date_naive()), None)
                .await
                .unwrap();
        }

        assert!(balancer.select().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn day_cap_excludes_a_relay() {
        let mut relay = relay_fixture(1, 10, 100);
        relay.max_per_day = 10;
        let (balancer, kv) = balancer_with(vec![relay]);
        let now = Local::now();
        for _ in 0..10 {
            kv.incr(&keys::smtp_day(1, now.date_naive()), None)
                .await
                .unwrap();
        }

        assert!(balancer.select().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn exhausted_pool_returns_none() {
        let (balancer, kv) = balancer_with(vec![
            relay_fixture(1, 10, 1),
            relay_fixture(2, 5, 1),
        ]);
        let now = Local::now();
        kv.incr(&keys::smtp_hour(1, now), None).await.unwrap();
        kv.incr(&keys::smtp_hour(2, now), None).await.unwrap();

        assert!(balancer.select().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn selection_does_not_mutate_counters() {
        let (balancer, kv) = balancer_with(vec![relay_fixture(1, 10, 100)]);

        balancer.select().await.unwrap().unwrap();

        assert_eq!(
            kv.get_i64(&keys::smtp_hour(1, Local::now())).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn success_accounting_sets_counter_ttls() {
        let (balancer, kv) = balancer_with(vec![relay_fixture(1, 10, 100)]);
        let now = Local::now();

        balancer.on_send_success(1).await.unwrap();
        balancer.on_send_success(1).await.unwrap();

        assert_eq!(
            kv.get_i64(&keys::smtp_hour(1, now)).await.unwrap(),
            Some(2)
        );
        assert_eq!(
            kv.get_i64(&keys::smtp_day(1, now.date_naive()))
                .await
                .unwrap(),
            Some(2)
        );
        assert!(kv.ttl(&keys::smtp_hour(1, now)).await.unwrap().is_some());
        assert!(kv
            .ttl(&keys::smtp_day(1, now.date_naive()))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn reset_clears_both_counters() {
        let (balancer, kv) = balancer_with(vec![relay_fixture(1, 10, 100)]);
        balancer.on_send_success(1).await.unwrap();

        balancer.reset_counters(1).await.unwrap();

        assert_eq!(balancer.current_usage(1).await.unwrap(), (0, 0));
        assert_eq!(
            kv.get_i64(&keys::smtp_hour(1, Local::now())).await.unwrap(),
            None
        );
    }
}
