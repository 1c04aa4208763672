//! 命令行接口模块
//!
//! 提供CLI参数解析和应用程序装配

pub mod app;
pub mod args;

// 重新导出主要类型
pub use app::{report_fatal, Application};
pub use args::{Args, LogLevel};
