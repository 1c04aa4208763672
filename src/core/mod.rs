//! 核心模块
//!
//! 包含服务描述、回调隔离执行和服务生命周期管理

pub mod descriptor;
pub mod isolation;
pub mod service;

// 重新导出主要类型
pub use descriptor::{
    moscow_offset, Callback, ServiceDescriptor, ServiceLogger, TracingLogger, ValidatedService,
};
pub use isolation::{isolate, IsolatedOutcome};
pub use service::{ServiceRunner, ServiceState, ShutdownHandle};
