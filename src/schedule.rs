//! Wall-clock gate for automatic submissions.
//!
//! The receiving party's deadline is defined in a fixed reference timezone,
//! while the trigger's own day boundary may roll over at a different moment.
//! A submission is therefore allowed only when the calendar day name matches
//! the report kind's submission day in *both* zones, and the reference-zone
//! hour is still before the cutoff.

use crate::formatter::ReportKind;
use crate::order::ReportWindow;
use chrono::{DateTime, Datelike, Duration, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

/// Zone the receiving party's deadline is defined in.
pub const REFERENCE_TIMEZONE: Tz = chrono_tz::America::New_York;

/// Reports must land before this reference-zone hour on the submission day.
pub const SUBMISSION_CUTOFF_HOUR: u32 = 13;

/// Decides whether "now" is inside the allowed submission window and what
/// reporting period a submission would cover. Stateless; every answer is
/// derived from the clock values passed in.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleGate;

impl ScheduleGate {
    /// True iff the weekday matches the kind's submission day in both the
    /// caller's zone and the reference zone, and the reference hour is
    /// strictly before the cutoff. A day-name mismatch between the two
    /// zones yields false, never true.
    pub fn is_time_to_submit<L: TimeZone>(
        &self,
        kind: ReportKind,
        now_local: &DateTime<L>,
        now_reference: &DateTime<Tz>,
    ) -> bool {
        let day = kind.submission_day();
        now_local.weekday() == day
            && now_reference.weekday() == day
            && now_reference.hour() < SUBMISSION_CUTOFF_HOUR
    }

    /// The reporting period a submission at `now_reference` covers: the
    /// most recent submission day strictly before today (a full week back
    /// when today is the day) at start-of-day, through the following sixth
    /// day at end-of-day. Tuesday–Monday for physical, Monday–Sunday for
    /// digital.
    pub fn current_window(&self, kind: ReportKind, now_reference: &DateTime<Tz>) -> ReportWindow {
        let today = now_reference.date_naive();
        let day = kind.submission_day();

        let offset =
            (today.weekday().num_days_from_monday() + 7 - day.num_days_from_monday()) % 7;
        let days_back = if offset == 0 { 7 } else { i64::from(offset) };

        let start_date = today - Duration::days(days_back);
        let end_date = start_date + Duration::days(6);

        let start = reference_to_utc(start_date.and_hms_opt(0, 0, 0).unwrap_or_default());
        let end = reference_to_utc(end_date.and_hms_opt(23, 59, 59).unwrap_or_default());

        ReportWindow::new(start, end)
    }

    /// Window used to answer "already delivered this period?".
    ///
    /// Deliveries are stamped on the deadline day, after the reporting
    /// period has closed, so the dedup check covers the reporting period
    /// extended through end-of-day "today" in the reference zone.
    pub fn dedup_window(&self, kind: ReportKind, now_reference: &DateTime<Tz>) -> ReportWindow {
        let report = self.current_window(kind, now_reference);
        let today_close = reference_to_utc(
            now_reference
                .date_naive()
                .and_hms_opt(23, 59, 59)
                .unwrap_or_default(),
        );
        ReportWindow::new(report.start(), today_close.max(report.end()))
    }
}

/// Interpret a naive timestamp in the reference zone and convert to UTC.
/// Ambiguous or skipped local times (DST edges) resolve to the earliest
/// valid instant.
fn reference_to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    REFERENCE_TIMEZONE
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}
