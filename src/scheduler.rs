//! Tick-driven orchestration of the whole pipeline.
//!
//! Each tick re-evaluates the full decision from scratch: time gate,
//! already-delivered check, configuration preconditions, build, upload.
//! Nothing escapes a tick as an unhandled fault; errors are logged and the
//! next tick retries.

use crate::builder::ReportBuilder;
use crate::config::SoundscanConfig;
use crate::delivery::Deliverer;
use crate::formatter::ReportKind;
use crate::ledger::SubmissionLedger;
use crate::schedule::{ScheduleGate, REFERENCE_TIMEZONE};
use crate::Result;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info};

/// What one scheduler tick (or manual submission) amounted to. The
/// operator-facing outcomes — delivered, already delivered, missing
/// configuration — are distinguishable so settings problems are never
/// mistaken for transfer problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Outside the submission window; nothing was attempted.
    NotDue,
    /// A successful delivery already exists for this period.
    AlreadyDelivered,
    /// Encoder options or channel credentials are incomplete; no attempt.
    MissingConfiguration,
    Delivered,
    /// Build or delivery failed; the next tick retries.
    Failed,
}

/// Drives gate → builder → deliverer → ledger for one report kind at a
/// time. All collaborators are handed in at construction; there is no
/// ambient registry and no singleton state.
pub struct Scheduler {
    gate: ScheduleGate,
    builder: ReportBuilder,
    deliverer: Deliverer,
    ledger: Arc<dyn SubmissionLedger>,
    config: SoundscanConfig,
}

impl Scheduler {
    pub fn new(
        gate: ScheduleGate,
        builder: ReportBuilder,
        deliverer: Deliverer,
        ledger: Arc<dyn SubmissionLedger>,
        config: SoundscanConfig,
    ) -> Self {
        Self {
            gate,
            builder,
            deliverer,
            ledger,
            config,
        }
    }

    /// One scheduled evaluation. No-ops unless the clock says it is time.
    pub async fn tick<L: TimeZone>(
        &self,
        kind: ReportKind,
        now_local: &DateTime<L>,
        now_reference: &DateTime<Tz>,
    ) -> TickOutcome {
        if !self.gate.is_time_to_submit(kind, now_local, now_reference) {
            return TickOutcome::NotDue;
        }
        self.submit_now(kind, now_reference).await
    }

    /// Manually triggered delivery: the same decision chain minus the time
    /// gate, so an operator can resubmit after fixing settings.
    pub async fn submit_now(&self, kind: ReportKind, now_reference: &DateTime<Tz>) -> TickOutcome {
        match self.try_submit(kind, now_reference).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(kind = %kind, "submission attempt failed: {err:#}");
                TickOutcome::Failed
            }
        }
    }

    async fn try_submit(
        &self,
        kind: ReportKind,
        now_reference: &DateTime<Tz>,
    ) -> Result<TickOutcome> {
        let window = self.gate.current_window(kind, now_reference);
        let dedup = self.gate.dedup_window(kind, now_reference);

        if self.ledger.was_delivered_in_window(kind, &dedup).await? {
            info!(kind = %kind, "report already delivered for this period");
            return Ok(TickOutcome::AlreadyDelivered);
        }

        if !self.config.has_necessary_options(kind) || !self.config.has_credentials(kind) {
            error!(
                kind = %kind,
                "report submission skipped: configuration is incomplete"
            );
            return Ok(TickOutcome::MissingConfiguration);
        }

        let report = self.builder.build(kind, &self.config, window).await?;
        info!(
            kind = %kind,
            details = report.detail_count(),
            rejected = report.rejected.len(),
            "report built"
        );

        let credentials = self.config.credentials(kind);
        let delivered = self
            .deliverer
            .upload(
                kind,
                &credentials,
                &report.render(),
                now_reference.with_timezone(&Utc),
            )
            .await;

        Ok(if delivered {
            TickOutcome::Delivered
        } else {
            TickOutcome::Failed
        })
    }

    /// Hourly-style loop for one report kind. Each pass is independent;
    /// a failure only affects that pass.
    pub async fn run(&self, kind: ReportKind, interval: Duration) {
        loop {
            let now_utc = Utc::now();
            let now_reference = now_utc.with_timezone(&REFERENCE_TIMEZONE);
            let now_local = chrono::Local::now();

            let outcome = self.tick(kind, &now_local, &now_reference).await;
            debug!(kind = %kind, ?outcome, "scheduler tick");

            sleep(interval).await;
        }
    }
}
