pub mod executors;
pub mod process;
pub mod service;

pub use executors::SimulatedExecutor;
pub use process::run_worker_process;
pub use service::TaskWorker;
