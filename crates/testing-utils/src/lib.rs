//! # Cronlease Testing Utils
//!
//! 工作区共享的测试工具：内存任务仓储、可编排的任务执行器、测试数据构建器。
//!
//! ```toml
//! [dev-dependencies]
//! cronlease-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
