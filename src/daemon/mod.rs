//! 进程级支持模块
//!
//! 提供单实例 PID 文件锁和 Unix 信号处理

pub mod pid;
pub mod signal_handler;

// 重新导出主要类型
pub use pid::{default_pid_path, is_process_alive, read_pid, PidGuard};
pub use signal_handler::{
    termination_signals, wait_for_termination, Termination, RELOAD_SIGNAL, TERMINATION_SIGNALS,
};
