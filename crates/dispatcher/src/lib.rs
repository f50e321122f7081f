pub mod dispatcher;
pub mod launcher;
pub mod lease_manager;
pub mod scheduler;

pub use dispatcher::{DispatchOutcome, TaskDispatcher};
pub use launcher::{InProcessLauncher, ProcessLauncher, WorkerLauncher};
pub use lease_manager::LeaseManager;
pub use scheduler::SchedulerLoop;
