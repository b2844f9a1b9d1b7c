//! # Delivery Worker
//!
//! Background worker that claims due delivery jobs, hands each notification
//! to the transport for its channel, and records the outcome. Failed attempts
//! are retried with exponential backoff until the job's attempt budget is
//! spent; the notification is marked `failed` on every failed attempt and
//! `sent` once a transport accepts it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Duration as ChronoDuration;
use metrics::{counter, gauge, histogram};
use rand::{Rng, thread_rng};
use sea_orm::DatabaseConnection;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::channels::ChannelRegistry;
use crate::config::QueueConfig;
use crate::error::RepositoryError;
use crate::models::{delivery_job, notification};
use crate::repositories::{DeliveryJobRepository, NotificationRepository, now};
use crate::settings::SettingsStore;
use crate::tenant::TenantContext;
use crate::transports::{DeliveryEnvelope, TransportError, TransportRegistry};

/// Attempt budget, per-attempt timeout and backoff curve.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub base_seconds: f64,
    pub max_seconds: f64,
    pub jitter_factor: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            attempt_timeout: Duration::from_secs(config.attempt_timeout_seconds),
            base_seconds: config.backoff_base_seconds as f64,
            max_seconds: config.backoff_max_seconds as f64,
            jitter_factor: config.backoff_jitter_factor,
        }
    }

    /// Seconds to wait after `failed_attempts` failures: `min(base * 2^(n-1), max)` plus jitter.
    pub fn backoff_seconds(&self, failed_attempts: u32) -> f64 {
        let exponent = failed_attempts.saturating_sub(1).min(30) as i32;
        let backoff = (self.base_seconds * 2_f64.powi(exponent)).min(self.max_seconds);
        let spread = self.jitter_factor * backoff;
        let jitter = if spread > 0.0 {
            thread_rng().gen_range(0.0..spread)
        } else {
            0.0
        };
        backoff + jitter
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

/// What happened to one claimed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Notification was already `sent`; duplicate task
    AlreadySent,
    /// Notification row no longer exists
    Missing,
    /// Attempt failed; the job is queued again
    Retrying { error: String },
    /// Attempt failed and no retry remains
    Failed { error: String },
}

impl DeliveryOutcome {
    fn as_label(&self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered => "delivered",
            DeliveryOutcome::AlreadySent => "already_sent",
            DeliveryOutcome::Missing => "missing",
            DeliveryOutcome::Retrying { .. } => "retrying",
            DeliveryOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone)]
struct WorkerLimits {
    tick: Duration,
    claim_batch: usize,
}

#[derive(Clone)]
pub struct DeliveryWorker {
    db: DatabaseConnection,
    tenant: TenantContext,
    channels: Arc<ChannelRegistry>,
    transports: Arc<TransportRegistry>,
    settings: Arc<SettingsStore>,
    policy: RetryPolicy,
    limits: WorkerLimits,
    permits: Arc<Semaphore>,
    app_url: String,
}

impl DeliveryWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: DatabaseConnection,
        tenant: TenantContext,
        channels: Arc<ChannelRegistry>,
        transports: Arc<TransportRegistry>,
        settings: Arc<SettingsStore>,
        queue: &QueueConfig,
        app_url: String,
    ) -> Self {
        Self {
            db,
            tenant,
            channels,
            transports,
            settings,
            policy: RetryPolicy::from_config(queue),
            limits: WorkerLimits {
                tick: Duration::from_millis(queue.tick_ms.max(1)),
                claim_batch: queue.claim_batch.max(1),
            },
            permits: Arc::new(Semaphore::new(queue.concurrency.max(1))),
            app_url,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run the worker loop until `shutdown` fires.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            tick_ms = self.limits.tick.as_millis() as u64,
            claim_batch = self.limits.claim_batch,
            max_attempts = self.policy.max_attempts,
            "Starting delivery worker"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Delivery worker shutdown requested");
                    break;
                }
                _ = sleep(self.limits.tick) => {
                    if let Err(err) = self.tick().await {
                        error!(error = %err, "Delivery worker tick failed");
                    }
                }
            }
        }

        info!("Delivery worker stopped");
    }

    /// Requeue stale jobs, then claim and run one batch. Returns the number of jobs run.
    pub async fn tick(&self) -> Result<usize, RepositoryError> {
        let jobs = DeliveryJobRepository::new(&self.db);
        let at = now();

        let stale_after = ChronoDuration::from_std(self.policy.attempt_timeout * 2)
            .unwrap_or_else(|_| ChronoDuration::minutes(1));
        let requeued = jobs.requeue_stale(at, stale_after).await?;
        if requeued > 0 {
            warn!(requeued, "Returned stale delivery jobs to the queue");
        }

        let claimed = jobs.claim(self.limits.claim_batch, at).await?;
        gauge!("notifier_queue_claimed").set(claimed.len() as f64);
        if claimed.is_empty() {
            return Ok(0);
        }

        let count = claimed.len();
        debug!(count, "Claimed delivery jobs");

        let mut handles = Vec::with_capacity(count);
        for job in claimed {
            let permit = match self.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let worker = self.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let job_id = job.id;
                if let Err(err) = worker.run_job(job).await {
                    error!(job_id = %job_id, error = %err, "Delivery job errored");
                }
            }));
        }

        for handle in handles {
            if let Err(err) = handle.await {
                error!(error = %err, "Delivery task panicked");
            }
        }

        Ok(count)
    }

    /// Tick until nothing due remains. Delayed and backed-off jobs are left queued.
    pub async fn drain(&self) -> Result<usize, RepositoryError> {
        let mut total = 0;
        loop {
            let ran = self.tick().await?;
            if ran == 0 {
                return Ok(total);
            }
            total += ran;
        }
    }

    /// Deliver one claimed job inside its tenant scope.
    #[instrument(skip(self, job), fields(job_id = %job.id, notification_id = %job.notification_id, attempt = job.attempts))]
    pub async fn run_job(&self, job: delivery_job::Model) -> Result<DeliveryOutcome, RepositoryError> {
        let tenant = self.tenant.clone();
        tenant
            .scope(job.tenant_id, async move { self.deliver(&job).await })
            .await
    }

    async fn deliver(&self, job: &delivery_job::Model) -> Result<DeliveryOutcome, RepositoryError> {
        let jobs = DeliveryJobRepository::new(&self.db);
        let notifications = NotificationRepository::new(&self.db);

        let Some(notification) = notifications
            .find_by_id(job.tenant_id, job.notification_id)
            .await?
        else {
            warn!("Notification for delivery job no longer exists");
            jobs.mark_discarded(job.id, "notification not found").await?;
            return Ok(DeliveryOutcome::Missing);
        };

        if notification.is_sent() {
            debug!("Notification already sent, skipping duplicate task");
            jobs.mark_succeeded(job.id).await?;
            return Ok(DeliveryOutcome::AlreadySent);
        }

        let transport = notification
            .channel_type()
            .and_then(|channel| self.transports.get(channel));
        let Some(transport) = transport else {
            let error = format!(
                "No transport registered for channel '{}'",
                notification.channel
            );
            error!(channel = %notification.channel, "{error}");
            notifications.mark_failed(notification.id, &error).await?;
            jobs.mark_discarded(job.id, &error).await?;
            counter!("notifier_delivery_total", "channel" => notification.channel.clone(), "outcome" => "failed")
                .increment(1);
            return Ok(DeliveryOutcome::Failed { error });
        };

        let channel = transport.channel_type();
        let envelope = self.envelope(&notification).await?;

        let started = Instant::now();
        gauge!("notifier_delivery_in_flight").increment(1.0);
        let result = {
            scopeguard::defer! {
                gauge!("notifier_delivery_in_flight").decrement(1.0);
            }
            match tokio::time::timeout(self.policy.attempt_timeout, transport.send(&envelope)).await
            {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(self.policy.attempt_timeout.as_secs())),
            }
        };
        histogram!("notifier_delivery_duration_seconds", "channel" => channel.as_str())
            .record(started.elapsed().as_secs_f64());

        let outcome = match result {
            Ok(true) => {
                notifications.mark_sent(notification.id).await?;
                jobs.mark_succeeded(job.id).await?;
                info!(channel = %channel, user_id = notification.user_id, "Notification delivered");
                DeliveryOutcome::Delivered
            }
            Ok(false) => {
                self.handle_failure(job, &notification, "Provider rejected the notification", true)
                    .await?
            }
            Err(err) => {
                self.handle_failure(job, &notification, &err.to_string(), err.is_retryable())
                    .await?
            }
        };

        counter!("notifier_delivery_total", "channel" => channel.as_str(), "outcome" => outcome.as_label())
            .increment(1);
        Ok(outcome)
    }

    async fn envelope(
        &self,
        notification: &notification::Model,
    ) -> Result<DeliveryEnvelope, RepositoryError> {
        let channel = notification
            .channel_type()
            .ok_or_else(|| RepositoryError::validation_error("Unknown channel type"))?;
        let settings = self
            .channels
            .get_channel(channel)
            .await?
            .map(|channel| channel.settings)
            .unwrap_or_else(HashMap::new);
        let analytics = self.settings.analytics().await;

        Ok(DeliveryEnvelope {
            notification_id: notification.id,
            tenant_id: notification.tenant_id,
            channel,
            recipient: notification.recipient(),
            subject: notification.subject.clone(),
            content: notification.content.clone(),
            data: notification.data.clone().unwrap_or_default(),
            tracking_token: Some(notification.tracking_token.clone()),
            settings,
            open_tracking: analytics.enabled && analytics.track_opens,
            app_url: self.app_url.clone(),
        })
    }

    /// Mark the attempt failed, then either requeue the job or run the exhaustion hook.
    async fn handle_failure(
        &self,
        job: &delivery_job::Model,
        notification: &notification::Model,
        error: &str,
        retryable: bool,
    ) -> Result<DeliveryOutcome, RepositoryError> {
        let notifications = NotificationRepository::new(&self.db);
        notifications.mark_failed(notification.id, error).await?;

        let attempts = job.attempts.max(0) as u32;
        let max_attempts = (job.max_attempts.max(1) as u32).min(self.policy.max_attempts.max(1));
        if retryable && attempts < max_attempts {
            let backoff = self.policy.backoff_seconds(attempts);
            let available_at = now() + ChronoDuration::milliseconds((backoff * 1_000.0) as i64);
            DeliveryJobRepository::new(&self.db)
                .schedule_retry(job.id, available_at, error)
                .await?;
            warn!(
                attempt = attempts,
                max_attempts,
                backoff_seconds = backoff,
                error,
                "Delivery attempt failed, retrying"
            );
            return Ok(DeliveryOutcome::Retrying {
                error: error.to_string(),
            });
        }

        self.on_exhausted(job, error).await?;
        error!(
            attempt = attempts,
            max_attempts, retryable, error, "Delivery failed permanently"
        );
        Ok(DeliveryOutcome::Failed {
            error: error.to_string(),
        })
    }

    /// Terminal failure hook: close the job and make sure the notification reads `failed`.
    async fn on_exhausted(
        &self,
        job: &delivery_job::Model,
        error: &str,
    ) -> Result<(), RepositoryError> {
        DeliveryJobRepository::new(&self.db)
            .mark_failed(job.id, error)
            .await?;
        NotificationRepository::new(&self.db)
            .mark_failed(job.notification_id, error)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter_factor: f64) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(30),
            base_seconds: 5.0,
            max_seconds: 300.0,
            jitter_factor,
        }
    }

    #[test]
    fn backoff_doubles_per_failure() {
        let policy = policy(0.0);
        assert_eq!(policy.backoff_seconds(1), 5.0);
        assert_eq!(policy.backoff_seconds(2), 10.0);
        assert_eq!(policy.backoff_seconds(3), 20.0);
    }

    #[test]
    fn backoff_is_capped_and_jittered() {
        let policy = policy(0.1);
        let first = policy.backoff_seconds(1);
        assert!((5.0..5.5).contains(&first));

        let capped = policy.backoff_seconds(20);
        assert!((300.0..330.0).contains(&capped));
    }

    #[test]
    fn policy_reads_queue_config() {
        let policy = RetryPolicy::from_config(&QueueConfig::default());
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.attempt_timeout, Duration::from_secs(30));
    }
}
