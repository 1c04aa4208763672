//! 信号处理模块
//!
//! 提供终止信号等待和配置重载信号监听

use crate::error::ServiceError;
use futures::stream::StreamExt;
use signal_hook::consts::{SIGINT, SIGTERM, SIGUSR2};
use signal_hook_tokio::Signals;
use tokio::sync::broadcast;
use tracing::{error, info};

/// 使等待阶段结束的终止信号
pub const TERMINATION_SIGNALS: [i32; 2] = [SIGINT, SIGTERM];

/// 触发配置重载的信号
pub const RELOAD_SIGNAL: i32 = SIGUSR2;

/// 等待阶段结束的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// 收到操作系统信号
    Signal(i32),
    /// 通过关闭句柄主动请求
    Requested,
}

/// 注册配置重载信号监听
pub fn reload_signals() -> std::io::Result<Signals> {
    Signals::new([RELOAD_SIGNAL])
}

/// 信号名称，用于日志
pub fn signal_name(signal: i32) -> &'static str {
    match signal {
        SIGINT => "SIGINT",
        SIGTERM => "SIGTERM",
        SIGUSR2 => "SIGUSR2",
        _ => "UNKNOWN",
    }
}

/// 注册终止信号监听
///
/// 注册完成后 SIGINT/SIGTERM 不再执行默认的终止动作，而是进入返回的信号流
pub fn termination_signals() -> Result<Signals, ServiceError> {
    Signals::new(TERMINATION_SIGNALS).map_err(ServiceError::Signal)
}

/// 等待终止信号或主动关闭请求
///
/// # 参数
/// * `signals` - 已注册的终止信号流，见 [`termination_signals`]
/// * `shutdown_rx` - 关闭请求接收器
///
/// # 返回
/// * `Termination` - 结束原因
pub async fn wait_for_termination(
    mut signals: Signals,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> Termination {
    info!("等待终止信号...");

    let handle = signals.handle();

    let termination = tokio::select! {
        Some(signal) = signals.next() => {
            info!("接收到 {} 信号，开始停止服务...", signal_name(signal));
            Termination::Signal(signal)
        }
        received = shutdown_rx.recv() => {
            if let Err(e) = received {
                error!("等待关闭信号时发生错误: {e}");
            }
            info!("接收到关闭请求，开始停止服务...");
            Termination::Requested
        }
    };

    handle.close();
    termination
}
