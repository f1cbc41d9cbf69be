pub mod orchestrator;
pub mod schedule;
pub mod summary;

pub use orchestrator::{Orchestrator, RunOptions};
pub use schedule::prioritize;
pub use summary::{FetchSummary, HashtagReport, HashtagStatus, MediaStats, Phase, RunSummary};
