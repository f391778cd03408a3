// Pipeline orchestration
//
// The ordered element chain, its derived state, and the events published
// to whatever owns the pipeline.

pub mod events;
pub mod pipeline_manager;
pub mod state;

pub use events::PipelineEvent;
pub use pipeline_manager::Pipeline;
pub use state::{reduce_states, PipelineState};
