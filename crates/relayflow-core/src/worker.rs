//! Worker pool
//!
//! Fixed-size fleet of send workers. Each worker polls the task queue
//! and delivers every recipient of a task independently: up to three
//! attempts with linear backoff, re-selecting a relay on each attempt.
//! Terminal outcomes become a send log row and a stats counter bump;
//! nothing is ever surfaced back to the submitting client.

use crate::balancer::LoadBalancer;
use crate::mailer::MailTransport;
use crate::queue::{self, EmailTask, TaskQueue};
use crate::quota::QuotaEngine;
use crate::stats::StatsService;
use relayflow_common::types::send_status;
use relayflow_storage::models::{NewSendLog, SmtpRelay};
use relayflow_storage::{SendLogRepository, TenantRepository};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Per-recipient attempt budget
const MAX_ATTEMPTS: u32 = 3;

/// Fixed-size pool of send workers
pub struct WorkerPool {
    queue: Arc<TaskQueue>,
    balancer: Arc<LoadBalancer>,
    transport: Arc<dyn MailTransport>,
    quota: Arc<QuotaEngine>,
    stats: Arc<StatsService>,
    send_logs: Arc<dyn SendLogRepository>,
    tenants: Arc<dyn TenantRepository>,
    count: usize,
}

impl WorkerPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<TaskQueue>,
        balancer: Arc<LoadBalancer>,
        transport: Arc<dyn MailTransport>,
        quota: Arc<QuotaEngine>,
        stats: Arc<StatsService>,
        send_logs: Arc<dyn SendLogRepository>,
        tenants: Arc<dyn TenantRepository>,
        count: usize,
    ) -> Self {
        Self {
            queue,
            balancer,
            transport,
            quota,
            stats,
            send_logs,
            tenants,
            count,
        }
    }

    /// Spawn all workers; they exit when the shutdown flag flips
    pub fn spawn(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        info!(count = self.count, "Starting send workers");
        (0..self.count)
            .map(|id| {
                let pool = Arc::clone(self);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { pool.worker_loop(id, shutdown).await })
            })
            .collect()
    }

    /// Poll loop; shutdown is observed between polls so a popped task is
    /// never dropped mid-delivery
    async fn worker_loop(&self, id: usize, shutdown: watch::Receiver<bool>) {
        info!(worker = id, "Send worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.queue.pop(queue::POP_TIMEOUT).await {
                Ok(Some(task)) => self.process_task(&task).await,
                Ok(None) => {}
                Err(e) => {
                    warn!(worker = id, error = %e, "Failed to poll task queue");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
        info!(worker = id, "Send worker stopped");
    }

    /// Deliver every recipient of a task; complete when each has either
    /// succeeded or exhausted its attempts
    pub async fn process_task(&self, task: &EmailTask) {
        for recipient in &task.to {
            match self.deliver(task, recipient).await {
                Ok(relay) => self.record_success(task, recipient, &relay).await,
                Err(last_err) => self.record_failure(task, recipient, &last_err).await,
            }
        }
    }

    async fn deliver(
        &self,
        task: &EmailTask,
        recipient: &str,
    ) -> std::result::Result<SmtpRelay, String> {
        let mut last_err = String::new();
        let mut attempts = 0u32;

        while attempts < MAX_ATTEMPTS {
            let relay = match self.balancer.select().await {
                Ok(Some(relay)) => relay,
                Ok(None) => {
                    last_err = "all relays exhausted".to_string();
                    warn!(
                        attempt = attempts + 1,
                        recipient, "No relay with remaining capacity"
                    );
                    self.backoff(attempts).await;
                    attempts += 1;
                    continue;
                }
                Err(e) => {
                    last_err = e.to_string();
                    warn!(attempt = attempts + 1, recipient, error = %e, "Relay selection failed");
                    self.backoff(attempts).await;
                    attempts += 1;
                    continue;
                }
            };

            match self.transport.send(&relay, recipient, task).await {
                Ok(()) => {
                    info!(relay = %relay.name, recipient, "Message delivered");
                    return Ok(relay);
                }
                Err(e) => {
                    last_err = e.to_string();
                    warn!(
                        attempt = attempts + 1,
                        relay = %relay.name,
                        recipient,
                        error = %e,
                        "Delivery attempt failed"
                    );
                    self.backoff(attempts).await;
                    attempts += 1;
                }
            }
        }

        Err(format!("failed after {} attempts: {}", MAX_ATTEMPTS, last_err))
    }

    async fn backoff(&self, attempts: u32) {
        tokio::time::sleep(Duration::from_secs((attempts + 1) as u64)).await;
    }

    async fn record_success(&self, task: &EmailTask, recipient: &str, relay: &SmtpRelay) {
        let log = NewSendLog {
            tenant_id: task.tenant_id,
            recipient: recipient.to_string(),
            subject: task.subject.clone(),
            status: send_status::SUCCESS.to_string(),
            error_msg: None,
            relay_id: relay.id,
        };
        if let Err(e) = self.send_logs.append(log).await {
            error!(error = %e, "Failed to append success log");
        }
        if let Err(e) = self.stats.record_sent(task.tenant_id).await {
            error!(error = %e, "Failed to bump sent counter");
        }
        if let Err(e) = self.balancer.on_send_success(relay.id).await {
            error!(error = %e, "Failed to bump relay counters");
        }
        if let Err(e) = self.quota.consume(task.tenant_id).await {
            error!(error = %e, "Failed to consume quota");
        }
        if let Err(e) = self.tenants.increment_total_used(task.tenant_id).await {
            error!(error = %e, "Failed to bump durable total_used");
        }
    }

    async fn record_failure(&self, task: &EmailTask, recipient: &str, last_err: &str) {
        error!(recipient, error = last_err, "Delivery permanently failed");
        let log = NewSendLog {
            tenant_id: task.tenant_id,
            recipient: recipient.to_string(),
            subject: task.subject.clone(),
            status: send_status::FAILED.to_string(),
            error_msg: Some(last_err.to_string()),
            relay_id: 0,
        };
        if let Err(e) = self.send_logs.append(log).await {
            error!(error = %e, "Failed to append failure log");
        }
        if let Err(e) = self.stats.record_failed(task.tenant_id).await {
            error!(error = %e, "Failed to bump failed counter");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys;
    use crate::testutil::{relay_fixture, tenant_fixture, MemRelayRepo, MemSendLogRepo,
        MemTenantRepo, MemUsageRepo};
    use async_trait::async_trait;
    use chrono::Local;
    use relayflow_common::{Error, Result};
    use relayflow_storage::{KvStore, MemoryStore};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Transport that replays a scripted list of outcomes, then succeeds
    struct ScriptedTransport {
        script: Mutex<VecDeque<bool>>,
        calls: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(script: Vec<bool>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MailTransport for ScriptedTransport {
        async fn send(&self, _: &SmtpRelay, _: &str, _: &EmailTask) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let ok = self.script.lock().unwrap().pop_front().unwrap_or(true);
            if ok {
                Ok(())
            } else {
                Err(Error::Smtp("connection refused".to_string()))
            }
        }
    }

    struct Fixture {
        pool: WorkerPool,
        kv: Arc<MemoryStore>,
        send_logs: Arc<MemSendLogRepo>,
        tenants: Arc<MemTenantRepo>,
        relays: Arc<MemRelayRepo>,
        transport: Arc<ScriptedTransport>,
    }

    fn fixture(script: Vec<bool>) -> Fixture {
        let kv: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let tenants = Arc::new(MemTenantRepo::new(vec![tenant_fixture(1)]));
        let relays = Arc::new(MemRelayRepo::new(vec![relay_fixture(1, 10, 100)]));
        let send_logs = Arc::new(MemSendLogRepo::new());
        let transport = Arc::new(ScriptedTransport::new(script));

        let queue = Arc::new(TaskQueue::new(kv.clone()));
        let balancer = Arc::new(LoadBalancer::new(relays.clone(), kv.clone()));
        let quota = Arc::new(QuotaEngine::new(kv.clone(), tenants.clone()));
        let stats = Arc::new(StatsService::new(
            kv.clone(),
            Arc::new(MemUsageRepo::new()),
            send_logs.clone(),
            tenants.clone(),
            relays.clone(),
        ));

        let pool = WorkerPool::new(
            queue,
            balancer.clone(),
            transport.clone(),
            quota,
            stats,
            send_logs.clone(),
            tenants.clone(),
            1,
        );

        Fixture {
            pool,
            kv,
            send_logs,
            tenants,
            relays,
            transport,
        }
    }

    fn task(to: Vec<&str>) -> EmailTask {
        EmailTask {
            tenant_id: 1,
            to: to.into_iter().map(str::to_string).collect(),
            subject: "s".to_string(),
            html: None,
            text: Some("t".to_string()),
        }
    }

    #[tokio::test]
    async fn success_records_log_and_all_counters() {
        let f = fixture(vec![true]);

        f.pool.process_task(&task(vec!["x@y.example"])).await;

        let logs = f.send_logs.all();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, "success");
        assert_eq!(logs[0].relay_id, 1);
        assert_eq!(logs[0].recipient, "x@y.example");

        let today = keys::today();
        assert_eq!(f.kv.get_i64(&keys::minute(1)).await.unwrap(), Some(1));
        assert_eq!(f.kv.get_i64(&keys::daily(1, today)).await.unwrap(), Some(1));
        assert_eq!(f.kv.get_i64(&keys::total(1)).await.unwrap(), Some(1));
        assert_eq!(
            f.kv.get_i64(&keys::stats("sent", 1, today)).await.unwrap(),
            Some(1)
        );
        assert_eq!(
            f.kv.get_i64(&keys::smtp_hour(1, Local::now())).await.unwrap(),
            Some(1)
        );
        assert_eq!(f.tenants.total_used(1), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_record_a_failure_without_touching_quota() {
        let f = fixture(vec![false, false, false]);

        f.pool.process_task(&task(vec!["x@y.example"])).await;

        assert_eq!(f.transport.calls(), 3);

        let logs = f.send_logs.all();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, "failed");
        assert_eq!(logs[0].relay_id, 0);
        assert!(logs[0]
            .error_msg
            .as_deref()
            .unwrap()
            .contains("failed after 3 attempts"));

        let today = keys::today();
        assert_eq!(
            f.kv.get_i64(&keys::stats("failed", 1, today)).await.unwrap(),
            Some(1)
        );
        assert_eq!(f.kv.get_i64(&keys::total(1)).await.unwrap(), None);
        assert_eq!(
            f.kv.get_i64(&keys::smtp_hour(1, Local::now())).await.unwrap(),
            None
        );
        // worker failures never feed the relay's health state
        assert_eq!(f.relays.snapshot(1).unwrap().failure_count, 0);
        assert_eq!(f.relays.snapshot(1).unwrap().status, "active");
    }

    #[tokio::test(start_paused = true)]
    async fn a_failed_attempt_is_retried_and_can_succeed() {
        let f = fixture(vec![false, true]);

        f.pool.process_task(&task(vec!["x@y.example"])).await;

        assert_eq!(f.transport.calls(), 2);
        let logs = f.send_logs.all();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, "success");
    }

    #[tokio::test(start_paused = true)]
    async fn retry_budget_is_per_recipient() {
        // first recipient burns its three attempts, second succeeds at once
        let f = fixture(vec![false, false, false, true]);

        f.pool
            .process_task(&task(vec!["a@y.example", "b@y.example"]))
            .await;

        assert_eq!(f.transport.calls(), 4);
        let logs = f.send_logs.all();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].status, "failed");
        assert_eq!(logs[0].recipient, "a@y.example");
        assert_eq!(logs[1].status, "success");
        assert_eq!(logs[1].recipient, "b@y.example");
    }

    #[tokio::test(start_paused = true)]
    async fn no_available_relay_fails_without_a_transport_call() {
        let f = fixture(vec![]);
        // saturate the single relay's hourly cap
        for _ in 0..100 {
            f.kv.incr(&keys::smtp_hour(1, Local::now()), None)
                .await
                .unwrap();
        }

        f.pool.process_task(&task(vec!["x@y.example"])).await;

        assert_eq!(f.transport.calls(), 0);
        let logs = f.send_logs.all();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, "failed");
        assert!(logs[0]
            .error_msg
            .as_deref()
            .unwrap()
            .contains("all relays exhausted"));
    }
}
