//! Purge Scheduler
//!
//! Periodically purges expired trash for every registered entity kind. Kinds are purged
//! in their own tasks, so a failing or panicking kind never holds up the others, and a
//! failed tick never stops the timer.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use mockall::automock;
use tokio::{
    sync::oneshot,
    task::{JoinError, JoinHandle, JoinSet},
    time::MissedTickBehavior,
};
use tracing::{debug, error, info};

use crate::{
    kinds::EntityKind,
    lifecycle::{EntityLifecycleManager, LifecycleError, LifecycleStore, PurgeReport},
};

/// Shortest accepted tick period.
const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Anything that can purge expired trash for one entity kind.
#[automock]
#[async_trait]
pub trait PurgeTarget: Send + Sync {
    fn kind(&self) -> EntityKind;

    async fn purge(&self, retention: Duration) -> Result<PurgeReport, LifecycleError>;
}

#[async_trait]
impl<S> PurgeTarget for EntityLifecycleManager<S>
where
    S: LifecycleStore + 'static,
{
    fn kind(&self) -> EntityKind {
        EntityLifecycleManager::kind(self)
    }

    async fn purge(&self, retention: Duration) -> Result<PurgeReport, LifecycleError> {
        self.purge_expired(retention).await
    }
}

/// Scheduler timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeSettings {
    /// Time between ticks.
    pub period: Duration,

    /// Default retention window, for kinds registered without an override.
    pub retention: Duration,
}

impl Default for PurgeSettings {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(24 * 60 * 60),
            retention: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

/// How one kind fared in a tick.
#[derive(Debug)]
pub enum KindOutcome {
    /// The pass ran; per-entity failures are counted in the report.
    Purged(PurgeReport),

    /// The scan failed or the retention window could not be applied.
    Failed(LifecycleError),

    /// The task panicked. Other kinds in the tick are unaffected.
    Panicked,

    /// The task was aborted before it finished.
    Cancelled,
}

impl KindOutcome {
    #[must_use]
    pub const fn report(&self) -> Option<&PurgeReport> {
        match self {
            Self::Purged(report) => Some(report),
            _ => None,
        }
    }
}

/// Result of one tick, in registration order.
#[derive(Debug, Default)]
pub struct TickSummary {
    /// One entry per registered kind.
    pub outcomes: Vec<(EntityKind, KindOutcome)>,
}

impl TickSummary {
    /// Outcome for `kind`, if it was registered.
    #[must_use]
    pub fn outcome(&self, kind: EntityKind) -> Option<&KindOutcome> {
        self.outcomes
            .iter()
            .find(|(registered, _)| *registered == kind)
            .map(|(_, outcome)| outcome)
    }

    /// Entities purged across every kind.
    #[must_use]
    pub fn purged(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|(_, outcome)| outcome.report())
            .map(|report| report.purged)
            .sum()
    }

    /// Kinds whose purge did not complete.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.report().is_none())
            .count()
    }
}

#[derive(Clone)]
struct Registration {
    kind: EntityKind,
    retention: Duration,
    target: Arc<dyn PurgeTarget>,
}

/// Periodically purges expired trash for every registered kind.
///
/// Each kind runs in its own task per tick, so a failure or panic in one kind never
/// stops the others.
#[derive(Clone)]
pub struct PurgeScheduler {
    settings: PurgeSettings,
    registrations: Vec<Registration>,
}

impl Debug for PurgeScheduler {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("PurgeScheduler")
            .field("settings", &self.settings)
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl PurgeScheduler {
    #[must_use]
    pub fn new(settings: PurgeSettings) -> Self {
        Self {
            settings,
            registrations: Vec::new(),
        }
    }

    #[must_use]
    pub fn settings(&self) -> PurgeSettings {
        self.settings
    }

    /// Register a kind with the default retention window.
    pub fn register(&mut self, target: Arc<dyn PurgeTarget>) -> &mut Self {
        let retention = self.settings.retention;

        self.register_with_retention(target, retention)
    }

    /// Register a kind with its own retention window.
    pub fn register_with_retention(
        &mut self,
        target: Arc<dyn PurgeTarget>,
        retention: Duration,
    ) -> &mut Self {
        let kind = target.kind();

        debug!(%kind, ?retention, "registered for purging");

        self.registrations.push(Registration {
            kind,
            retention,
            target,
        });

        self
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<EntityKind> {
        self.registrations.iter().map(|r| r.kind).collect()
    }

    /// Run one tick to completion.
    pub async fn run_tick(&self) -> TickSummary {
        let handles: Vec<(EntityKind, JoinHandle<Result<PurgeReport, LifecycleError>>)> = self
            .registrations
            .iter()
            .map(|registration| {
                let target = Arc::clone(&registration.target);
                let retention = registration.retention;

                (
                    registration.kind,
                    tokio::spawn(async move { target.purge(retention).await }),
                )
            })
            .collect();

        let mut summary = TickSummary::default();

        for (kind, handle) in handles {
            let outcome = match handle.await {
                Ok(Ok(report)) => KindOutcome::Purged(report),
                Ok(Err(source)) => {
                    error!(%kind, error = %source, "purge failed");
                    KindOutcome::Failed(source)
                }
                Err(join) => join_failure(kind, &join),
            };

            summary.outcomes.push((kind, outcome));
        }

        info!(
            kinds = summary.outcomes.len(),
            purged = summary.purged(),
            failures = summary.failures(),
            "purge tick finished"
        );

        summary
    }

    /// Start ticking in the background. The first tick runs immediately.
    #[must_use]
    pub fn spawn(self) -> PurgeSchedulerHandle {
        let period = self.settings.period.max(MIN_PERIOD);
        let scheduler = Arc::new(self);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let join = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let mut ticks = JoinSet::new();

            info!(?period, kinds = ?scheduler.kinds(), "purge scheduler started");

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = interval.tick() => {
                        let scheduler = Arc::clone(&scheduler);
                        ticks.spawn(async move { scheduler.run_tick().await });
                    }
                    Some(finished) = ticks.join_next(), if !ticks.is_empty() => {
                        log_tick_panic(finished);
                    }
                }
            }

            while let Some(finished) = ticks.join_next().await {
                log_tick_panic(finished);
            }

            info!("purge scheduler stopped");
        });

        PurgeSchedulerHandle {
            stop_tx: Some(stop_tx),
            join: Some(join),
        }
    }
}

fn join_failure(kind: EntityKind, join: &JoinError) -> KindOutcome {
    if join.is_panic() {
        error!(%kind, "purge task panicked");
        KindOutcome::Panicked
    } else {
        error!(%kind, "purge task was cancelled");
        KindOutcome::Cancelled
    }
}

fn log_tick_panic(finished: Result<TickSummary, JoinError>) {
    if let Err(join) = finished {
        error!(error = %join, "purge tick did not complete");
    }
}

/// Running scheduler. Dropping it stops the timer without waiting for in-flight ticks.
#[derive(Debug)]
pub struct PurgeSchedulerHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl PurgeSchedulerHandle {
    /// Stop the timer and wait for in-flight ticks to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheduler task panicked.
    pub async fn shutdown(mut self) -> Result<(), JoinError> {
        if let Some(stop_tx) = self.stop_tx.take() {
            stop_tx.send(()).ok();
        }

        match self.join.take() {
            Some(join) => join.await,
            None => Ok(()),
        }
    }
}

impl Drop for PurgeSchedulerHandle {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            stop_tx.send(()).ok();
        }
    }
}
