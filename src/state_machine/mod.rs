// Job state machine
//
// Tracks the lifecycle of a single job run. The machine is in-memory and owned
// by the job it describes; every applied transition is kept as an audit trail.

pub mod errors;
pub mod events;
pub mod job_state_machine;
pub mod states;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::JobEvent;
pub use job_state_machine::{JobStateMachine, JobTransition};
pub use states::{JobState, TaskResultStatus};
