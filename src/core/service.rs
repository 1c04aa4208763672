//! 服务生命周期模块
//!
//! 负责校验服务描述、获取单实例锁、调用启动回调、等待终止信号并调用停止回调

use crate::core::descriptor::{ServiceDescriptor, ValidatedService};
use crate::core::isolation::isolate;
use crate::daemon::pid::PidGuard;
use crate::daemon::signal_handler::{termination_signals, wait_for_termination};
use crate::error::ServiceError;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// 服务状态
///
/// `Created → Validated → Starting → Running → (Waiting) → Stopping → Stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// 尚未校验
    Created,
    /// 已校验
    Validated,
    /// 正在调用启动回调
    Starting,
    /// 启动完成
    Running,
    /// 等待终止信号
    Waiting,
    /// 正在调用停止回调
    Stopping,
    /// 已停止（终态）
    Stopped,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Validated => "validated",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

type SharedState = Arc<RwLock<ServiceState>>;

fn read_state(state: &SharedState) -> ServiceState {
    *state.read().unwrap_or_else(PoisonError::into_inner)
}

/// 关闭句柄
///
/// 可在其他任务中结束 `run(true)` 的等待阶段，效果与收到终止信号相同
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    shutdown_tx: broadcast::Sender<()>,
    state: SharedState,
}

impl ShutdownHandle {
    /// 请求结束等待阶段
    pub fn shutdown(&self) {
        if self.shutdown_tx.send(()).is_err() {
            debug!("服务已不再等待关闭请求");
        }
    }

    /// 当前服务状态
    pub fn state(&self) -> ServiceState {
        read_state(&self.state)
    }
}

/// 服务运行器
pub struct ServiceRunner {
    descriptor: Option<ServiceDescriptor>,
    validated: Option<ValidatedService>,
    pid_file: Option<PathBuf>,
    pid_guard: Option<PidGuard>,
    state: SharedState,
    shutdown_tx: broadcast::Sender<()>,
    // 在构造时订阅，保证等待开始前发出的关闭请求不会丢失
    shutdown_rx: broadcast::Receiver<()>,
}

impl ServiceRunner {
    /// 创建新的服务运行器
    pub fn new(descriptor: ServiceDescriptor) -> Self {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        Self {
            descriptor: Some(descriptor),
            validated: None,
            pid_file: None,
            pid_guard: None,
            state: Arc::new(RwLock::new(ServiceState::Created)),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// 指定 PID 文件路径，未指定时使用默认路径
    pub fn with_pid_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.pid_file = Some(path.into());
        self
    }

    /// 当前服务状态
    pub fn state(&self) -> ServiceState {
        read_state(&self.state)
    }

    /// 获取关闭句柄
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown_tx: self.shutdown_tx.clone(),
            state: Arc::clone(&self.state),
        }
    }

    /// 持有的 PID 文件锁
    pub fn pid_guard(&self) -> Option<&PidGuard> {
        self.pid_guard.as_ref()
    }

    fn set_state(&self, next: ServiceState) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        debug!("服务状态: {} -> {}", *state, next);
        *state = next;
    }

    /// 校验服务描述
    ///
    /// 重复调用返回第一次校验的结果
    ///
    /// # 返回
    /// * `Result<&ValidatedService, ServiceError>` - 缺少启动回调时返回 `MissingStart`
    pub fn validate(&mut self) -> Result<&ValidatedService, ServiceError> {
        let validated = match self.validated.take() {
            Some(validated) => validated,
            None => {
                let descriptor = self.descriptor.take().ok_or(ServiceError::MissingStart)?;
                let validated = descriptor.validate()?;
                self.set_state(ServiceState::Validated);
                validated
            }
        };
        Ok(self.validated.insert(validated))
    }

    /// 获取单实例锁
    ///
    /// 这是运行过程中第一个有副作用的步骤，失败时不会调用任何用户代码
    pub fn acquire_instance(&mut self) -> Result<&PidGuard, ServiceError> {
        let guard = match self.pid_guard.take() {
            Some(guard) => guard,
            None => PidGuard::acquire(self.pid_file.as_deref())?,
        };
        Ok(self.pid_guard.insert(guard))
    }

    /// 运行服务
    ///
    /// * `wait = true`：先注册 SIGINT/SIGTERM，启动回调在独立的分离线程中隔离执行，
    ///   当前任务等待终止信号或关闭句柄，然后调用停止回调。启动线程不会被等待，
    ///   运行时可以在启动回调仍未返回时被释放
    /// * `wait = false`：同步调用启动回调后返回，服务保持 `Running`，由调用方稍后调用 [`ServiceRunner::stop`]
    ///
    /// 停止回调不做隔离，其中的 panic 会继续传播
    pub async fn run(&mut self, wait: bool) -> Result<(), ServiceError> {
        let state = self.state();
        if !matches!(state, ServiceState::Created | ServiceState::Validated) {
            return Err(ServiceError::AlreadyStarted { state });
        }

        let service = self.validate()?.clone();
        let pid_path = self.acquire_instance()?.path().to_path_buf();

        let now = chrono::Utc::now().with_timezone(&service.timezone());
        info!(
            "服务启动: 时间 {}, 工作线程数 {}, PID文件 {}",
            now.format("%Y-%m-%d %H:%M:%S %:z"),
            service.max_procs(),
            pid_path.display()
        );

        if !wait {
            self.set_state(ServiceState::Starting);
            (service.start_callback())();
            self.set_state(ServiceState::Running);
            return Ok(());
        }

        // 在发布 Waiting 之前注册，避免终止信号落到默认处理上
        let signals = termination_signals()?;

        self.set_state(ServiceState::Starting);
        let start = Arc::clone(service.start_callback());
        let logger = Arc::clone(service.logger());
        let spawned = std::thread::Builder::new()
            .name("service-start".to_string())
            .spawn(move || {
                if isolate(|| start(), &*logger).is_panicked() {
                    error!("启动回调发生 panic，服务继续运行");
                }
            });
        if let Err(e) = spawned {
            self.set_state(ServiceState::Validated);
            return Err(ServiceError::StartThread(e));
        }
        self.set_state(ServiceState::Running);

        self.set_state(ServiceState::Waiting);
        let termination = wait_for_termination(signals, &mut self.shutdown_rx).await;
        debug!("等待结束: {:?}", termination);

        self.stop_service(&service);
        Ok(())
    }

    /// 停止以 `run(false)` 启动的服务
    ///
    /// # 返回
    /// * `Result<(), ServiceError>` - 服务不在 `Running` 状态时返回 `NotRunning`
    pub fn stop(&mut self) -> Result<(), ServiceError> {
        let state = self.state();
        if state != ServiceState::Running {
            return Err(ServiceError::NotRunning { state });
        }
        let service = self
            .validated
            .clone()
            .ok_or(ServiceError::NotRunning { state })?;
        self.stop_service(&service);
        Ok(())
    }

    fn stop_service(&self, service: &ValidatedService) {
        self.set_state(ServiceState::Stopping);
        if let Some(stop) = service.stop_callback() {
            stop();
        }
        self.set_state(ServiceState::Stopped);
        service.logger().info("Bye-Bye");
    }

    /// 运行服务，致命错误时记录诊断信息并以非零状态退出进程
    pub async fn run_or_exit(&mut self, wait: bool) {
        if let Err(e) = self.run(wait).await {
            report_fatal(&e, self.pid_file.as_deref());
            std::process::exit(1);
        }
    }
}

impl fmt::Debug for ServiceRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRunner")
            .field("state", &self.state())
            .field("service", &self.validated)
            .field("pid_file", &self.pid_file)
            .field("pid_guard", &self.pid_guard)
            .finish()
    }
}

fn report_fatal(error: &ServiceError, pid_file: Option<&Path>) {
    match error {
        ServiceError::Pid(e) if e.is_already_running() => {
            error!("服务已在运行，本实例退出: {}", e);
        }
        _ => {
            error!(
                "服务启动失败: {} (PID文件: {})",
                error,
                pid_file.map_or_else(|| "默认路径".to_string(), |p| p.display().to_string())
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    fn runner_in(dir: &TempDir, descriptor: ServiceDescriptor) -> ServiceRunner {
        ServiceRunner::new(descriptor).with_pid_file(dir.path().join("service.pid"))
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ServiceState::Created.to_string(), "created");
        assert_eq!(ServiceState::Waiting.to_string(), "waiting");
        assert_eq!(
            serde_json::to_string(&ServiceState::Stopped).unwrap(),
            "\"stopped\""
        );
    }

    #[test]
    fn test_validate_transitions_state() {
        let temp_dir = TempDir::new().unwrap();
        let mut runner = runner_in(&temp_dir, ServiceDescriptor::new().on_start(|| {}));
        assert_eq!(runner.state(), ServiceState::Created);

        runner.validate().unwrap();
        assert_eq!(runner.state(), ServiceState::Validated);
        // 重复校验返回同一结果
        assert!(runner.validate().is_ok());
    }

    #[tokio::test]
    async fn test_missing_start_fails_before_pid_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut runner = runner_in(&temp_dir, ServiceDescriptor::new());

        let err = runner.run(false).await.unwrap_err();
        assert!(matches!(err, ServiceError::MissingStart));
        assert!(!temp_dir.path().join("service.pid").exists());
        assert_eq!(runner.state(), ServiceState::Created);
    }

    #[tokio::test]
    async fn test_run_without_wait_then_stop() {
        let temp_dir = TempDir::new().unwrap();
        let started = Arc::new(AtomicBool::new(false));
        let stopped = Arc::new(AtomicBool::new(false));
        let (s1, s2) = (Arc::clone(&started), Arc::clone(&stopped));
        let mut runner = runner_in(
            &temp_dir,
            ServiceDescriptor::new()
                .on_start(move || s1.store(true, Ordering::SeqCst))
                .on_stop(move || s2.store(true, Ordering::SeqCst)),
        );

        runner.run(false).await.unwrap();
        assert!(started.load(Ordering::SeqCst));
        assert!(!stopped.load(Ordering::SeqCst));
        assert_eq!(runner.state(), ServiceState::Running);
        assert_eq!(
            runner.pid_guard().map(|g| g.pid()),
            Some(std::process::id())
        );

        runner.stop().unwrap();
        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(runner.state(), ServiceState::Stopped);
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut runner = runner_in(&temp_dir, ServiceDescriptor::new().on_start(|| {}));

        runner.run(false).await.unwrap();
        let err = runner.run(false).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::AlreadyStarted {
                state: ServiceState::Running
            }
        ));
    }

    #[tokio::test]
    async fn test_stop_requires_running() {
        let temp_dir = TempDir::new().unwrap();
        let mut runner = runner_in(&temp_dir, ServiceDescriptor::new().on_start(|| {}));

        let err = runner.stop().unwrap_err();
        assert!(matches!(
            err,
            ServiceError::NotRunning {
                state: ServiceState::Created
            }
        ));

        runner.run(false).await.unwrap();
        runner.stop().unwrap();
        assert!(matches!(
            runner.stop().unwrap_err(),
            ServiceError::NotRunning {
                state: ServiceState::Stopped
            }
        ));
    }

    #[tokio::test]
    async fn test_run_with_wait_until_shutdown_requested() {
        let temp_dir = TempDir::new().unwrap();
        let stopped = Arc::new(AtomicBool::new(false));
        let stopped_flag = Arc::clone(&stopped);
        let mut runner = runner_in(
            &temp_dir,
            ServiceDescriptor::new()
                .on_start(|| {})
                .on_stop(move || stopped_flag.store(true, Ordering::SeqCst)),
        );

        // 等待开始前发出的请求同样有效
        runner.shutdown_handle().shutdown();

        tokio::time::timeout(std::time::Duration::from_secs(5), runner.run(true))
            .await
            .expect("等待超时")
            .unwrap();
        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(runner.state(), ServiceState::Stopped);
    }

    #[test]
    fn test_runtime_drops_while_start_still_running() {
        let temp_dir = TempDir::new().unwrap();
        let released = Arc::new(AtomicBool::new(false));
        let released_flag = Arc::clone(&released);
        let mut runner = runner_in(
            &temp_dir,
            ServiceDescriptor::new().on_start(move || {
                while !released_flag.load(Ordering::SeqCst) {
                    std::thread::sleep(std::time::Duration::from_millis(20));
                }
            }),
        );
        runner.shutdown_handle().shutdown();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(runner.run(true)).unwrap();
        assert_eq!(runner.state(), ServiceState::Stopped);

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            drop(runtime);
            let _ = done_tx.send(());
        });
        let dropped = done_rx.recv_timeout(std::time::Duration::from_secs(3));
        released.store(true, Ordering::SeqCst);

        assert!(dropped.is_ok(), "启动回调未返回时运行时应当可以释放");
    }

    #[tokio::test]
    async fn test_second_runner_on_same_pid_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let started = Arc::new(AtomicBool::new(false));
        let started_flag = Arc::clone(&started);

        let mut first = runner_in(&temp_dir, ServiceDescriptor::new().on_start(|| {}));
        first.run(false).await.unwrap();

        let mut second = runner_in(
            &temp_dir,
            ServiceDescriptor::new().on_start(move || started_flag.store(true, Ordering::SeqCst)),
        );
        let err = second.run(false).await.unwrap_err();

        assert!(matches!(err, ServiceError::Pid(ref e) if e.is_already_running()));
        assert!(!started.load(Ordering::SeqCst));
        assert_eq!(second.state(), ServiceState::Validated);
    }
}
