//! # SoundScan Courier
//!
//! Converts a merchant's completed/refunded order history into the
//! fixed-format weekly sales report expected by a music-sales tracking
//! service, and delivers it over a secure file channel at most once per
//! reporting period.
//!
//! The pipeline is composed explicitly, with no ambient registries:
//!
//! ```text
//! Scheduler -> ScheduleGate -> ReportBuilder -> ReportFormatter
//!           -> Deliverer -> SubmissionLedger
//! ```
//!
//! External collaborators (the order store and the secure file transfer
//! session) are traits; everything behind them is out of scope here.

pub mod builder;
pub mod config;
pub mod delivery;
pub mod formatter;
pub mod ledger;
pub mod order;
pub mod schedule;
pub mod scheduler;

pub use builder::ReportBuilder;
pub use config::SoundscanConfig;
pub use delivery::{Deliverer, SecureChannelFactory, SecureFileChannel};
pub use formatter::{RejectReason, RejectedItem, Report, ReportFormatter, ReportKind};
pub use ledger::{FileSubmissionLedger, SubmissionEntry, SubmissionLedger};
pub use order::{LineItem, Order, OrderSource, OrderStatus, ReportWindow};
pub use schedule::ScheduleGate;
pub use scheduler::{Scheduler, TickOutcome};

pub type Result<T> = anyhow::Result<T>;

#[derive(thiserror::Error, Debug)]
pub enum SoundscanError {
    /// Header record came out the wrong length; the whole build is abandoned.
    #[error("header record is {actual} characters, expected {expected}")]
    HeaderLength { expected: usize, actual: usize },
    /// Trailer record came out shorter than the minimum legal length.
    #[error("trailer record is {actual} characters, expected at least {min}")]
    TrailerLength { min: usize, actual: usize },
    #[error("missing configuration: {0}")]
    MissingConfiguration(&'static str),
    #[error("authentication to {host} failed")]
    AuthenticationFailed { host: String },
    #[error("remote file {0} missing after upload")]
    RemoteFileMissing(String),
    #[error("channel error: {0}")]
    Channel(String),
    #[error("storage error: {0}")]
    Storage(String),
}
