pub mod grade;
pub mod launch;
pub mod loaders;
pub mod record;
pub mod stats;
pub mod submission;

pub use grade::Grade;
pub use launch::{EntryPoint, LaunchSpec, ProcessState};
pub use loaders::{discover_submissions, load_roster};
pub use record::{GradingRecord, TestCase, TestResult};
pub use stats::SummaryStats;
pub use submission::Submission;
