//! 服务描述模块
//!
//! 定义服务的启动/停止回调、时区、工作线程数和日志器，并在校验时填充默认值

use crate::error::ServiceError;
use chrono::{FixedOffset, Offset, Utc};
use std::sync::Arc;

/// 服务回调
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// 服务日志器
///
/// 生命周期只需要信息级和严重级两种日志，格式和输出位置由实现决定
pub trait ServiceLogger: Send + Sync {
    /// 记录一般信息
    fn info(&self, message: &str);

    /// 记录严重错误
    fn critical(&self, message: &str);
}

/// 基于 tracing 的默认日志器
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl ServiceLogger for TracingLogger {
    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn critical(&self, message: &str) {
        tracing::error!(severity = "critical", "{message}");
    }
}

/// UTC+3（Etc/GMT-3），莫斯科时间
pub fn moscow_offset() -> FixedOffset {
    FixedOffset::east_opt(3 * 3600).unwrap_or_else(utc_offset)
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// 服务描述
///
/// 只有启动回调是必填项，其余字段在 [`ServiceDescriptor::validate`] 时填充默认值
#[derive(Default, Clone)]
pub struct ServiceDescriptor {
    start: Option<Callback>,
    stop: Option<Callback>,
    timezone: Option<FixedOffset>,
    max_procs: Option<usize>,
    logger: Option<Arc<dyn ServiceLogger>>,
}

impl ServiceDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置启动回调
    pub fn on_start<F>(mut self, start: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.start = Some(Arc::new(start));
        self
    }

    /// 设置停止回调
    pub fn on_stop<F>(mut self, stop: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.stop = Some(Arc::new(stop));
        self
    }

    /// 设置时区，未设置时使用 UTC
    pub fn timezone(mut self, timezone: FixedOffset) -> Self {
        self.timezone = Some(timezone);
        self
    }

    /// 设置工作线程数，未设置或为 0 时使用 CPU 核心数
    pub fn max_procs(mut self, max_procs: usize) -> Self {
        self.max_procs = Some(max_procs);
        self
    }

    /// 设置日志器，未设置时使用 [`TracingLogger`]
    pub fn logger(mut self, logger: Arc<dyn ServiceLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// 校验服务描述并填充默认值
    ///
    /// # 返回
    /// * `Result<ValidatedService, ServiceError>` - 缺少启动回调时返回 `MissingStart`
    pub fn validate(self) -> Result<ValidatedService, ServiceError> {
        let start = self.start.ok_or(ServiceError::MissingStart)?;

        let max_procs = match self.max_procs {
            Some(n) if n >= 1 => n,
            _ => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        };

        Ok(ValidatedService {
            start,
            stop: self.stop,
            timezone: self.timezone.unwrap_or_else(utc_offset),
            max_procs,
            logger: self.logger.unwrap_or_else(|| Arc::new(TracingLogger)),
        })
    }
}

/// 校验后的服务描述，之后不再修改
#[derive(Clone)]
pub struct ValidatedService {
    start: Callback,
    stop: Option<Callback>,
    timezone: FixedOffset,
    max_procs: usize,
    logger: Arc<dyn ServiceLogger>,
}

impl ValidatedService {
    pub fn start_callback(&self) -> &Callback {
        &self.start
    }

    pub fn stop_callback(&self) -> Option<&Callback> {
        self.stop.as_ref()
    }

    pub fn timezone(&self) -> FixedOffset {
        self.timezone
    }

    pub fn max_procs(&self) -> usize {
        self.max_procs
    }

    pub fn logger(&self) -> &Arc<dyn ServiceLogger> {
        &self.logger
    }

    /// 按工作线程数构建多线程 tokio 运行时
    pub fn build_runtime(&self) -> Result<tokio::runtime::Runtime, ServiceError> {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.max_procs)
            .enable_all()
            .build()
            .map_err(ServiceError::Runtime)
    }
}

impl std::fmt::Debug for ValidatedService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatedService")
            .field("has_stop", &self.stop.is_some())
            .field("timezone", &self.timezone)
            .field("max_procs", &self.max_procs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_start() {
        let err = ServiceDescriptor::new().on_stop(|| {}).validate().unwrap_err();
        assert!(matches!(err, ServiceError::MissingStart));
    }

    #[test]
    fn test_validate_fills_defaults() {
        let service = ServiceDescriptor::new().on_start(|| {}).validate().unwrap();

        assert_eq!(service.timezone(), FixedOffset::east_opt(0).unwrap());
        assert!(service.max_procs() >= 1);
        assert!(service.stop_callback().is_none());
    }

    #[test]
    fn test_zero_max_procs_uses_cpu_count() {
        let service = ServiceDescriptor::new()
            .on_start(|| {})
            .max_procs(0)
            .validate()
            .unwrap();
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(service.max_procs(), cpus);
    }

    #[test]
    fn test_validate_keeps_explicit_values() {
        let service = ServiceDescriptor::new()
            .on_start(|| {})
            .on_stop(|| {})
            .timezone(moscow_offset())
            .max_procs(3)
            .validate()
            .unwrap();

        assert_eq!(service.timezone().local_minus_utc(), 3 * 3600);
        assert_eq!(service.max_procs(), 3);
        assert!(service.stop_callback().is_some());
    }

    #[test]
    fn test_build_runtime() {
        let service = ServiceDescriptor::new()
            .on_start(|| {})
            .max_procs(2)
            .validate()
            .unwrap();
        let runtime = service.build_runtime().unwrap();
        assert_eq!(runtime.block_on(async { 1 + 1 }), 2);
    }
}
