pub mod entry_point;
pub mod readiness;
pub mod record_store;
pub mod run_log;
pub mod scoring;

pub use entry_point::{EntryPointResolver, ENTRY_CANDIDATES};
pub use readiness::{ProbeReport, ReadinessProbe};
pub use record_store::{JsonFileStore, RecordSink};
pub use run_log::RunLog;
pub use scoring::{ScoreAggregator, ScoreSummary, STARTUP_TEST_NAME, STARTUP_WEIGHT};
