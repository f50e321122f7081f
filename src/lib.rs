pub mod app;
pub mod seed;
pub mod shutdown;

pub use app::{AppMode, Application};
pub use shutdown::ShutdownManager;
