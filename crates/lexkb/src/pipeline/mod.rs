pub mod config;
pub mod error;
pub mod progress;
pub mod result;
pub mod retry;
pub mod runner;
pub mod tree;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineWarning};
pub use progress::{LogProgress, NoopProgress, ProgressEvent, ProgressReporter};
pub use result::PipelineResult;
pub use retry::{run_optional, run_required, RetryPolicy, Stage, StageError, StageOutcome};
pub use runner::{Pipeline, Services};
pub use tree::{parse_structure, tree_depth_and_count, TreeNode, TreeSummary};
