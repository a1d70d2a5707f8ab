use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::sync::broadcast;

use crate::db::models::{Notification, NotificationBox, NotificationStatus};
use crate::db::repository::NotificationRepository;
use crate::error::AppResult;
use crate::services::gateway::PushOutcome;
use crate::services::push::PushService;
use crate::AppState;

/// Maximum relative deviation applied to a computed back-off delay.
const JITTER_DELTA: f64 = 0.2;

/// Counters for one sweep cycle.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub attempted: usize,
    pub delivered: usize,
    pub rescheduled: usize,
    pub failed: usize,
}

/// Background task that re-drives pending push notifications.
///
/// Each cycle drains the currently eligible set in bounded batches and pushes
/// serially. Several instances may run concurrently: status transitions are
/// conditional at the store and the terminal states absorb, so the worst case
/// is a duplicate push, which at-least-once delivery permits.
pub struct RetrySweeper {
    state: Arc<AppState>,
}

impl RetrySweeper {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Sweep-and-sleep loop. Observes the shutdown channel between items and
    /// between cycles; an in-flight gateway call is always awaited.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        loop {
            if !self.state.config.retry.enabled {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Retry sweeper shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_secs(60)) => {}
                }
                continue;
            }

            match self.sweep(Some(&mut shutdown_rx)).await {
                Ok((stats, interrupted)) => {
                    if stats.attempted > 0 {
                        tracing::info!(
                            "Retry sweep attempted {} pushes: {} delivered, {} rescheduled, {} failed",
                            stats.attempted,
                            stats.delivered,
                            stats.rescheduled,
                            stats.failed
                        );
                    }
                    if interrupted {
                        tracing::info!("Retry sweeper shutting down");
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Retry sweep failed: {:?}", e);
                }
            }

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Retry sweeper shutting down");
                    break;
                }
                _ = tokio::time::sleep(Duration::from_secs(
                    self.state.config.retry.sweep_interval_seconds,
                )) => {}
            }
        }
    }

    /// One full pass over the currently eligible notifications.
    pub async fn sweep_once(&self) -> AppResult<SweepStats> {
        self.sweep(None).await.map(|(stats, _)| stats)
    }

    async fn sweep(
        &self,
        mut shutdown: Option<&mut broadcast::Receiver<()>>,
    ) -> AppResult<(SweepStats, bool)> {
        let mut stats = SweepStats::default();
        let batch_size = self.state.config.retry.sweep_batch_size;

        loop {
            let batch = NotificationRepository::fetch_retryable(
                &self.state.db,
                &self.state.cipher,
                batch_size,
            )
            .await?;
            if batch.is_empty() {
                return Ok((stats, false));
            }

            let batch_len = batch.len() as i64;
            for (notification, subject) in batch {
                if let Some(rx) = shutdown.as_deref_mut() {
                    if rx.try_recv().is_ok() {
                        return Ok((stats, true));
                    }
                }
                self.process(notification, subject, &mut stats).await;
            }

            // A short batch means the eligible set is drained; processed
            // items have left it by transitioning or moving into the future.
            if batch_len < batch_size {
                return Ok((stats, false));
            }
        }
    }

    async fn process(
        &self,
        notification: Notification,
        subject: NotificationBox,
        stats: &mut SweepStats,
    ) {
        stats.attempted += 1;

        match PushService::push(&self.state, &subject, &notification).await {
            PushOutcome::Delivered => {
                match NotificationRepository::update_status(
                    &self.state.db,
                    &self.state.cipher,
                    &notification.notification_id,
                    NotificationStatus::Acknowledged,
                )
                .await
                {
                    Ok(_) => stats.delivered += 1,
                    Err(e) => tracing::warn!(
                        "Pushed notification {} but failed to acknowledge it: {}",
                        notification.notification_id,
                        e
                    ),
                }
            }
            PushOutcome::Failed(reason) => {
                let retry = &self.state.config.retry;
                let now = Utc::now().naive_utc();
                let delay = jittered_backoff(
                    &retry.interval_schedule,
                    notification.retry_count,
                    retry.max_backoff_seconds,
                );
                let next_retry = now + chrono::Duration::seconds(delay as i64);
                let deadline = notification.created_at
                    + chrono::Duration::seconds(retry.retry_window_seconds as i64);

                if next_retry > deadline {
                    tracing::warn!(
                        "Notification {} exhausted its retry window after {} failed pushes; marking FAILED (last error: {})",
                        notification.notification_id,
                        notification.retry_count + 1,
                        reason
                    );
                    match NotificationRepository::update_status(
                        &self.state.db,
                        &self.state.cipher,
                        &notification.notification_id,
                        NotificationStatus::Failed,
                    )
                    .await
                    {
                        Ok(_) => stats.failed += 1,
                        Err(e) => tracing::warn!(
                            "Failed to mark notification {} as FAILED: {}",
                            notification.notification_id,
                            e
                        ),
                    }
                } else {
                    tracing::debug!(
                        "Rescheduling notification {} for {} ({}s back-off) after push failure: {}",
                        notification.notification_id,
                        next_retry,
                        delay,
                        reason
                    );
                    match NotificationRepository::schedule_retry(
                        &self.state.db,
                        &self.state.cipher,
                        &notification.notification_id,
                        next_retry,
                    )
                    .await
                    {
                        Ok(_) => stats.rescheduled += 1,
                        Err(e) => tracing::warn!(
                            "Failed to reschedule notification {}: {}",
                            notification.notification_id,
                            e
                        ),
                    }
                }
            }
        }
    }
}

/// Schedule entry for the given attempt, clamped to the last entry and the
/// configured ceiling.
fn backoff_delay(schedule: &[u64], attempt: i32, max_backoff_seconds: u64) -> u64 {
    let idx = (attempt.max(0) as usize).min(schedule.len().saturating_sub(1));
    schedule
        .get(idx)
        .copied()
        .unwrap_or(max_backoff_seconds)
        .min(max_backoff_seconds)
}

/// Back-off with ±20% uniform jitter so a burst of failures does not
/// resynchronize into a thundering herd.
fn jittered_backoff(schedule: &[u64], attempt: i32, max_backoff_seconds: u64) -> u64 {
    let base = backoff_delay(schedule, attempt, max_backoff_seconds);
    let factor = 1.0 + rand::thread_rng().gen_range(-JITTER_DELTA..=JITTER_DELTA);
    (base as f64 * factor).round() as u64
}
