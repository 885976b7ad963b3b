//! Task queue
//!
//! A single FIFO list in the KV store. Producers LPUSH JSON-encoded
//! tasks, workers BRPOP with a short timeout. A task is gone once
//! popped; a worker crash after the pop loses it.

use crate::keys;
use relayflow_common::types::TenantId;
use relayflow_common::{Error, Result};
use relayflow_storage::KvStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// How long a worker blocks waiting for a task before re-polling
pub const POP_TIMEOUT: Duration = Duration::from_secs(5);

/// One queued submission; each recipient is delivered independently
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailTask {
    pub tenant_id: TenantId,
    pub to: Vec<String>,
    pub subject: String,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl EmailTask {
    /// A task needs at least one non-empty body
    pub fn has_body(&self) -> bool {
        self.html.as_deref().map(|s| !s.is_empty()).unwrap_or(false)
            || self.text.as_deref().map(|s| !s.is_empty()).unwrap_or(false)
    }
}

/// Producer/consumer handle over the `email_queue` list
pub struct TaskQueue {
    kv: Arc<dyn KvStore>,
}

impl TaskQueue {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Enqueue a task; encoding failures are submission errors
    pub async fn push(&self, task: &EmailTask) -> Result<()> {
        let payload = serde_json::to_string(task)
            .map_err(|e| Error::Queue(format!("Failed to encode task: {}", e)))?;
        self.kv.lpush(keys::EMAIL_QUEUE, &payload).await
    }

    /// Blocking pop; returns `None` on timeout. A payload that fails to
    /// decode is dropped with a log line, it is not retried.
    pub async fn pop(&self, timeout: Duration) -> Result<Option<EmailTask>> {
        let Some(payload) = self.kv.brpop(keys::EMAIL_QUEUE, timeout).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<EmailTask>(&payload) {
            Ok(task) => Ok(Some(task)),
            Err(e) => {
                warn!(error = %e, "Dropping undecodable task payload");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relayflow_storage::MemoryStore;

    fn task(tenant_id: TenantId) -> EmailTask {
        EmailTask {
            tenant_id,
            to: vec!["x@y.example".to_string()],
            subject: "hello".to_string(),
            html: None,
            text: Some("body".to_string()),
        }
    }

    #[tokio::test]
    async fn push_pop_preserves_order_and_content() {
        let kv = Arc::new(MemoryStore::new());
        let queue = TaskQueue::new(kv);

        queue.push(&task(1)).await.unwrap();
        queue.push(&task(2)).await.unwrap();

        let first = queue.pop(Duration::from_secs(1)).await.unwrap().unwrap();
        let second = queue.pop(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(first.tenant_id, 1);
        assert_eq!(second.tenant_id, 2);
        assert_eq!(first.to, vec!["x@y.example"]);
    }

    #[tokio::test(start_paused = true)]
    async fn pop_times_out_with_none() {
        let kv = Arc::new(MemoryStore::new());
        let queue = TaskQueue::new(kv);

        let popped = queue.pop(Duration::from_secs(5)).await.unwrap();
        assert!(popped.is_none());
    }

    #[tokio::test]
    async fn poison_payload_is_dropped() {
        let kv = Arc::new(MemoryStore::new());
        kv.lpush(keys::EMAIL_QUEUE, "not json").await.unwrap();
        let queue = TaskQueue::new(kv);

        let popped = queue.pop(Duration::from_secs(1)).await.unwrap();
        assert!(popped.is_none());

        // the payload is gone, not requeued
        let again = queue.pop(Duration::from_millis(10)).await.unwrap();
        assert!(again.is_none());
    }

    #[test]
    fn has_body_requires_a_non_empty_part() {
        let mut t = task(1);
        assert!(t.has_body());

        t.text = Some(String::new());
        t.html = None;
        assert!(!t.has_body());

        t.html = Some("<p>hi</p>".to_string());
        assert!(t.has_body());
    }
}
