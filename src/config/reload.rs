//! 配置热重载模块
//!
//! 监听 SIGUSR2 信号，从初始化时的路径重新加载配置并替换快照

use crate::config::store::ConfigStore;
use crate::daemon::signal_handler::{reload_signals, signal_name};
use futures::stream::StreamExt;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 重载计数
#[derive(Debug, Default)]
struct ReloadCounters {
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// 重载统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReloadStats {
    /// 成功的重载次数
    pub succeeded: u64,
    /// 失败的重载次数
    pub failed: u64,
}

/// 配置重载触发器
pub struct ReloadTrigger;

impl ReloadTrigger {
    /// 启动重载监听任务
    ///
    /// 必须在 tokio 运行时内调用。信号在函数返回前已经注册完成。
    /// 句柄被丢弃时监听继续运行，直到进程退出；需要确定性地停止时调用 [`ReloadHandle::shutdown`]。
    ///
    /// # 参数
    /// * `store` - 已初始化的配置存储
    ///
    /// # 返回
    /// * `std::io::Result<ReloadHandle>` - 监听句柄，信号注册失败时返回错误
    pub fn spawn(store: Arc<ConfigStore>) -> std::io::Result<ReloadHandle> {
        let signals = reload_signals()?;
        let signals_handle = signals.handle();

        let (request_tx, mut request_rx) = mpsc::unbounded_channel::<()>();
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
        let counters = Arc::new(ReloadCounters::default());

        let task_counters = Arc::clone(&counters);
        let task = tokio::spawn(async move {
            let mut signals = signals;
            info!("配置重载监听已启动");

            loop {
                tokio::select! {
                    Some(signal) = signals.next() => {
                        info!("接收到 {} 信号，重新加载配置...", signal_name(signal));
                    }
                    Some(()) = request_rx.recv() => {
                        info!("接收到重载请求，重新加载配置...");
                    }
                    Ok(()) = shutdown_rx.recv() => {
                        debug!("配置重载监听收到关闭请求");
                        break;
                    }
                    else => break,
                }

                Self::reload_once(&store, &task_counters).await;
            }

            signals_handle.close();
            info!("配置重载监听已停止");
        });

        Ok(ReloadHandle {
            request_tx,
            shutdown_tx,
            counters,
            task,
        })
    }

    /// 执行一次重载
    ///
    /// 失败时只记录日志，原快照继续生效，监听不退出
    async fn reload_once(store: &Arc<ConfigStore>, counters: &ReloadCounters) {
        let store = Arc::clone(store);
        match tokio::task::spawn_blocking(move || store.reload()).await {
            Ok(Ok(version)) => {
                counters.succeeded.fetch_add(1, Ordering::SeqCst);
                info!("配置重载成功，版本: {}", version);
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                error!("配置重载失败，继续使用当前配置: {}", e);
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                error!("配置重载任务异常: {}", e);
            }
        }
    }
}

/// 重载监听句柄
pub struct ReloadHandle {
    request_tx: mpsc::UnboundedSender<()>,
    shutdown_tx: broadcast::Sender<()>,
    counters: Arc<ReloadCounters>,
    task: JoinHandle<()>,
}

impl ReloadHandle {
    /// 手动请求一次重载，效果与收到重载信号相同
    ///
    /// # 返回
    /// * `bool` - 监听是否仍在运行
    pub fn trigger(&self) -> bool {
        self.request_tx.send(()).is_ok()
    }

    /// 当前重载统计
    pub fn stats(&self) -> ReloadStats {
        ReloadStats {
            succeeded: self.counters.succeeded.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
        }
    }

    /// 监听任务是否已经结束
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// 停止监听并等待任务结束
    pub async fn shutdown(self) {
        if self.shutdown_tx.send(()).is_err() {
            debug!("配置重载监听已经停止");
        }
        if let Err(e) = self.task.await {
            warn!("等待配置重载监听结束时出错: {}", e);
        }
    }
}
