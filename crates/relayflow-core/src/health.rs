//! Relay health controller
//!
//! Periodically probes every relay and owns the relay health state
//! machine: three consecutive probe failures disable a relay, a
//! successful probe after the recovery delay re-enables it. Worker send
//! errors never touch this state; only the controller's probes do.

use crate::mailer::RelayProbe;
use chrono::{Duration as ChronoDuration, Utc};
use relayflow_common::types::relay_status;
use relayflow_common::Result;
use relayflow_storage::models::{RelayHealthUpdate, SmtpRelay};
use relayflow_storage::SmtpRelayRepository;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Consecutive probe failures before a relay is disabled
pub const MAX_FAILURES: i32 = 3;

/// How often every relay is probed
pub const CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

fn recovery_delay() -> ChronoDuration {
    ChronoDuration::minutes(30)
}

/// Periodic prober and owner of relay failure state
pub struct HealthController {
    relays: Arc<dyn SmtpRelayRepository>,
    probe: Arc<dyn RelayProbe>,
}

impl HealthController {
    pub fn new(relays: Arc<dyn SmtpRelayRepository>, probe: Arc<dyn RelayProbe>) -> Self {
        Self { relays, probe }
    }

    /// Run until the shutdown flag flips
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Relay health controller started");
        let mut ticker = tokio::time::interval(CHECK_INTERVAL);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.check_all().await {
                        error!(error = %e, "Health check sweep failed");
                    }
                }
            }
        }
        info!("Relay health controller stopped");
    }

    /// One sweep over every relay
    pub async fn check_all(&self) -> Result<()> {
        for relay in self.relays.list().await? {
            match relay.status.as_str() {
                relay_status::PAUSED => {}
                relay_status::FAILED => self.check_failed(relay).await?,
                _ => self.check_active(relay).await?,
            }
        }
        Ok(())
    }

    async fn check_failed(&self, relay: SmtpRelay) -> Result<()> {
        let now = Utc::now();
        let Some(recover_at) = relay.auto_recover_at else {
            return Ok(());
        };
        if now < recover_at {
            return Ok(());
        }

        match self.probe.probe(&relay).await {
            Ok(()) => {
                info!(relay = %relay.name, "Relay recovered");
                self.relays
                    .save_health(
                        relay.id,
                        RelayHealthUpdate {
                            status: relay_status::ACTIVE.to_string(),
                            failure_count: 0,
                            last_failed_at: None,
                            last_checked_at: Some(now),
                            auto_recover_at: None,
                        },
                    )
                    .await
            }
            Err(e) => {
                let next = now + recovery_delay();
                warn!(relay = %relay.name, error = %e, next_attempt = %next, "Recovery probe failed");
                self.relays
                    .save_health(
                        relay.id,
                        RelayHealthUpdate {
                            status: relay_status::FAILED.to_string(),
                            failure_count: relay.failure_count,
                            last_failed_at: relay.last_failed_at,
                            last_checked_at: Some(now),
                            auto_recover_at: Some(next),
                        },
                    )
                    .await
            }
        }
    }

    async fn check_active(&self, relay: SmtpRelay) -> Result<()> {
        match self.probe.probe(&relay).await {
            Ok(()) => {
                if relay.failure_count > 0 {
                    self.relays
                        .save_health(
                            relay.id,
                            RelayHealthUpdate {
                                status: relay_status::ACTIVE.to_string(),
                                failure_count: 0,
                                last_failed_at: relay.last_failed_at,
                                last_checked_at: Some(Utc::now()),
                                auto_recover_at: None,
                            },
                        )
                        .await?;
                }
                Ok(())
            }
            Err(e) => {
                warn!(relay = %relay.name, error = %e, "Health probe failed");
                self.record_failure(&relay).await
            }
        }
    }

    /// Count a probe failure; at the threshold the relay is disabled
    /// with a scheduled recovery attempt
    async fn record_failure(&self, relay: &SmtpRelay) -> Result<()> {
        let now = Utc::now();
        let failure_count = relay.failure_count + 1;

        let update = if failure_count >= MAX_FAILURES {
            warn!(
                relay = %relay.name,
                failure_count,
                "Relay disabled after consecutive probe failures"
            );
            RelayHealthUpdate {
                status: relay_status::FAILED.to_string(),
                failure_count,
                last_failed_at: Some(now),
                last_checked_at: Some(now),
                auto_recover_at: Some(now + recovery_delay()),
            }
        } else {
            RelayHealthUpdate {
                status: relay_status::ACTIVE.to_string(),
                failure_count,
                last_failed_at: Some(now),
                last_checked_at: Some(now),
                auto_recover_at: None,
            }
        };

        self.relays.save_health(relay.id, update).await
    }
}
