//! 应用程序装配
//!
//! 把命令行参数、配置存储、热重载监听和服务运行器组装成可运行的守护进程

use crate::cli::args::Args;
use crate::config::{ConfigStore, ReloadTrigger};
use crate::core::{ServiceDescriptor, ServiceRunner};
use crate::error::{BootstrapError, Result, ServiceError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// 配置变更订阅名
const SUBSCRIBER_NAME: &str = "service-bootstrap";

/// 应用程序
#[derive(Debug)]
pub struct Application {
    args: Args,
    store: Arc<ConfigStore>,
}

impl Application {
    /// 创建新的应用程序
    pub fn new(args: Args) -> Self {
        Self {
            args,
            store: Arc::new(ConfigStore::new()),
        }
    }

    /// 配置存储
    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// 加载配置文件
    ///
    /// 必须在服务启动前完成，失败对启动来说是致命的
    pub fn init_config(&self) -> Result<()> {
        info!("加载配置文件: {}", self.args.config.display());
        self.store.init(&self.args.config)?;
        info!("配置加载成功，共 {} 个配置项", self.store.keys().len());
        Ok(())
    }

    /// 根据配置构建服务运行器
    ///
    /// 工作线程数取自配置项 `max_procs`，为 0 或缺失时使用 CPU 核心数
    pub fn build_runner(&self) -> ServiceRunner {
        let start_store = Arc::clone(&self.store);
        let stop_store = Arc::clone(&self.store);
        let max_procs = usize::try_from(self.store.int("max_procs", 0)).unwrap_or(0);

        let descriptor = ServiceDescriptor::new()
            .max_procs(max_procs)
            .on_start(move || {
                info!("服务已启动: {}", start_store.string("greeting", "hello"));

                let store = Arc::clone(&start_store);
                start_store.subscribe(SUBSCRIBER_NAME, move || {
                    info!(
                        "配置已更新 (版本 {}): greeting = {}, heartbeat = {:?}",
                        store.version(),
                        store.string("greeting", "hello"),
                        store.duration("heartbeat", Duration::from_secs(30))
                    );
                });
            })
            .on_stop(move || {
                stop_store.unsubscribe(SUBSCRIBER_NAME);
                info!("服务已停止");
            });

        let runner = ServiceRunner::new(descriptor);
        match &self.args.pid_file {
            Some(path) => runner.with_pid_file(path),
            None => runner,
        }
    }

    /// 运行服务直到停止
    ///
    /// 必须在 tokio 运行时内调用
    pub async fn serve(&self, runner: &mut ServiceRunner) -> Result<()> {
        let reload = ReloadTrigger::spawn(Arc::clone(&self.store))?;

        let wait = self.args.wait();
        runner.run(wait).await?;
        if !wait {
            runner.stop()?;
        }

        let stats = reload.stats();
        info!(
            "配置重载统计: 成功 {} 次, 失败 {} 次",
            stats.succeeded, stats.failed
        );
        reload.shutdown().await;
        Ok(())
    }
}

/// 输出致命错误的诊断信息
///
/// # 返回
/// * `i32` - 进程退出码
pub fn report_fatal(err: &BootstrapError) -> i32 {
    match err {
        BootstrapError::Service(ServiceError::Pid(e)) | BootstrapError::Pid(e)
            if e.is_already_running() =>
        {
            error!("服务已在运行: {}", e);
            eprintln!("already running: {e}");
        }
        BootstrapError::Config(e) => {
            error!("配置加载失败: {}", e);
            eprintln!("config error: {e}");
        }
        _ => {
            error!("服务运行失败: {}", err);
            eprintln!("error: {err}");
        }
    }
    1
}
