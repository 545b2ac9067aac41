pub mod engine;
pub mod history;
pub mod loop_control;
pub mod state;

pub use engine::{AgentLoop, StopHandle};
pub use state::{Action, ScrollDirection, StepOutcome, StepRecord, Task, TaskStatus};
