//! Service Bootstrap - 长期运行服务的启动工具包
//!
//! 为守护进程提供以下基础设施：
//! - 基于 PID 文件锁的单实例保证
//! - 并发安全的 JSON 配置存储
//! - SIGUSR2 触发的配置热重载与订阅通知
//! - 启动/等待/停止的服务生命周期管理和启动回调的 panic 隔离
//! - 结构化日志记录

#[cfg(not(unix))]
compile_error!("service-bootstrap 依赖 flock 和 Unix 信号，仅支持 Unix 平台");

pub mod cli;
pub mod config;
pub mod core;
pub mod daemon;
pub mod error;
pub mod logging;

// 重新导出主要类型
pub use crate::config::{ConfigSnapshot, ConfigStore, ReloadHandle, ReloadTrigger};
pub use crate::core::{IsolatedOutcome, ServiceDescriptor, ServiceLogger, ServiceRunner, ServiceState};
pub use crate::daemon::PidGuard;
pub use crate::error::{BootstrapError, ConfigError, PidError, ServiceError};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
