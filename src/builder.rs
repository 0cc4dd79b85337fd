//! Composition of the order store and the record encoder.

use crate::config::SoundscanConfig;
use crate::formatter::{Report, ReportFormatter, ReportKind};
use crate::order::{OrderSource, ReportWindow};
use crate::Result;
use std::sync::Arc;
use tracing::debug;

/// Fetches orders for a window and drives a [`ReportFormatter`]. Pure
/// composition: the only rule of its own is window normalization, which
/// [`ReportWindow::new`] already guarantees.
pub struct ReportBuilder {
    source: Arc<dyn OrderSource>,
}

impl ReportBuilder {
    pub fn new(source: Arc<dyn OrderSource>) -> Self {
        Self { source }
    }

    pub async fn build(
        &self,
        kind: ReportKind,
        config: &SoundscanConfig,
        window: ReportWindow,
    ) -> Result<Report> {
        let orders = self.source.fetch(&window).await?;
        debug!(
            kind = %kind,
            orders = orders.len(),
            start = %window.start(),
            end = %window.end(),
            "building report"
        );
        let formatter = ReportFormatter::new(kind, config);
        formatter.build(&window, &orders)
    }
}
