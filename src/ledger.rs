//! Durable append-only log of delivery attempts.
//!
//! The ledger is what makes the weekly submission idempotent: before a
//! delivery the scheduler asks whether a successful attempt already landed
//! inside the current reporting window. Failed attempts never block a retry.

use crate::formatter::ReportKind;
use crate::order::ReportWindow;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

/// One recorded delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionEntry {
    pub submitted_at: DateTime<Utc>,
    pub kind: ReportKind,
    pub success: bool,
}

/// Append-only record of delivery attempts per report kind.
#[async_trait]
pub trait SubmissionLedger: Send + Sync {
    async fn append(&self, entry: SubmissionEntry) -> Result<()>;

    /// All entries in append (chronological) order.
    async fn entries(&self) -> Result<Vec<SubmissionEntry>>;

    /// Remove every entry. Administrative use only.
    async fn purge(&self) -> Result<()>;

    /// Scans newest-first for a *successful* attempt of `kind` whose
    /// timestamp lies strictly inside `window`.
    async fn was_delivered_in_window(
        &self,
        kind: ReportKind,
        window: &ReportWindow,
    ) -> Result<bool> {
        let entries = self.entries().await?;
        Ok(entries.iter().rev().any(|e| {
            e.kind == kind && e.success && window.contains_exclusive(e.submitted_at)
        }))
    }
}

/// JSON-lines ledger on the local filesystem.
///
/// Appends take an exclusive fs2 lock so two processes cannot interleave a
/// partial line; reads tolerate a missing file (empty ledger) and skip
/// corrupt lines rather than failing the scan.
pub struct FileSubmissionLedger {
    path: PathBuf,
}

impl FileSubmissionLedger {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }
}

#[async_trait]
impl SubmissionLedger for FileSubmissionLedger {
    async fn append(&self, entry: SubmissionEntry) -> Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.lock_exclusive()?;
        let line = serde_json::to_string(&entry)?;
        let outcome = writeln!(file, "{line}");
        fs2::FileExt::unlock(&file)?;
        outcome?;
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<SubmissionEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        let mut entries = Vec::new();
        for line in raw.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<SubmissionEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(err) => warn!("skipping corrupt ledger line: {err}"),
            }
        }
        Ok(entries)
    }

    async fn purge(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn ts(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    fn ledger_in(dir: &tempfile::TempDir) -> FileSubmissionLedger {
        FileSubmissionLedger::new(dir.path().join("submissions.jsonl")).unwrap()
    }

    #[tokio::test]
    async fn empty_ledger_reports_nothing_delivered() {
        let dir = tempdir().unwrap();
        let ledger = ledger_in(&dir);
        let window = ReportWindow::new(ts(4, 0), ts(10, 23));
        assert!(!ledger
            .was_delivered_in_window(ReportKind::Physical, &window)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn only_successes_of_matching_kind_count() {
        let dir = tempdir().unwrap();
        let ledger = ledger_in(&dir);
        let window = ReportWindow::new(ts(4, 0), ts(10, 23));

        ledger
            .append(SubmissionEntry {
                submitted_at: ts(5, 9),
                kind: ReportKind::Physical,
                success: false,
            })
            .await
            .unwrap();
        ledger
            .append(SubmissionEntry {
                submitted_at: ts(5, 10),
                kind: ReportKind::Digital,
                success: true,
            })
            .await
            .unwrap();

        assert!(!ledger
            .was_delivered_in_window(ReportKind::Physical, &window)
            .await
            .unwrap());
        assert!(ledger
            .was_delivered_in_window(ReportKind::Digital, &window)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn boundary_timestamps_do_not_count() {
        let dir = tempdir().unwrap();
        let ledger = ledger_in(&dir);
        let window = ReportWindow::new(ts(4, 0), ts(10, 23));

        ledger
            .append(SubmissionEntry {
                submitted_at: ts(4, 0),
                kind: ReportKind::Physical,
                success: true,
            })
            .await
            .unwrap();

        assert!(!ledger
            .was_delivered_in_window(ReportKind::Physical, &window)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn entries_preserve_append_order_and_survive_purge() {
        let dir = tempdir().unwrap();
        let ledger = ledger_in(&dir);

        for day in [5, 6, 7] {
            ledger
                .append(SubmissionEntry {
                    submitted_at: ts(day, 9),
                    kind: ReportKind::Physical,
                    success: true,
                })
                .await
                .unwrap();
        }

        let entries = ledger.entries().await.unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.windows(2).all(|w| w[0].submitted_at <= w[1].submitted_at));

        ledger.purge().await.unwrap();
        assert!(ledger.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("submissions.jsonl");
        let ledger = FileSubmissionLedger::new(path.clone()).unwrap();

        ledger
            .append(SubmissionEntry {
                submitted_at: ts(5, 9),
                kind: ReportKind::Digital,
                success: true,
            })
            .await
            .unwrap();
        std::fs::write(
            &path,
            format!("{}\nnot json\n", std::fs::read_to_string(&path).unwrap().trim_end()),
        )
        .unwrap();

        assert_eq!(ledger.entries().await.unwrap().len(), 1);
    }
}
