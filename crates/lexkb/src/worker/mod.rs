pub mod backfill;
pub mod job;
pub mod poller;
pub mod setup;
pub mod state;

pub use backfill::{backfill_episodes, BackfillOptions, BackfillStats};
pub use job::{Job, JobOutcome, JobStatus};
pub use poller::{Poller, PollerStats};
pub use setup::{build_episode_writer, build_pipeline, build_services, database_path};
pub use state::{JobStateError, JobStateMachine};
