pub mod entities;
pub mod messages;
pub mod ports;
pub mod recurrence;
pub mod repositories;
pub mod sqlx_impls;
pub mod value_objects;

pub use cronlease_core::{SchedulerError, SchedulerResult};
pub use entities::*;
pub use messages::*;
pub use ports::TaskExecutor;
pub use recurrence::{
    initial_next_execution, next_execution, validate_schedule, CronScheduler,
};
pub use repositories::*;
pub use value_objects::*;
