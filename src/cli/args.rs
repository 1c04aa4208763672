//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use crate::logging::LogConfig;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Service Bootstrap - 单实例守护进程启动工具
#[derive(Parser, Debug, Clone)]
#[command(
    name = "service-bootstrap",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "JSON 配置文件路径",
        env = "SERVICE_BOOTSTRAP_CONFIG"
    )]
    pub config: PathBuf,

    /// PID文件路径
    #[arg(
        long,
        value_name = "FILE",
        help = "PID文件路径，默认 <home>/run/<程序名>.pid",
        env = "SERVICE_BOOTSTRAP_PID_FILE"
    )]
    pub pid_file: Option<PathBuf>,

    /// 日志级别
    #[arg(
        short,
        long,
        value_enum,
        default_value = "info",
        help = "日志级别",
        env = "SERVICE_BOOTSTRAP_LOG_LEVEL"
    )]
    pub log_level: LogLevel,

    /// 启动后不等待终止信号
    #[arg(long, help = "启动回调返回后立即停止服务，不等待终止信号")]
    pub no_wait: bool,

    /// 日志文件路径
    #[arg(
        long,
        value_name = "FILE",
        help = "同时把日志追加写入该文件",
        env = "SERVICE_BOOTSTRAP_LOG_FILE"
    )]
    pub log_file: Option<PathBuf>,

    /// 以JSON格式输出日志
    #[arg(long, help = "以JSON格式输出日志", env = "SERVICE_BOOTSTRAP_LOG_JSON")]
    pub log_json: bool,
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    /// 跟踪级别
    Trace,
    /// 调试级别
    Debug,
    /// 信息级别
    Info,
    /// 警告级别
    Warn,
    /// 错误级别
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

impl Args {
    /// 解析命令行参数
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// 是否等待终止信号
    pub fn wait(&self) -> bool {
        !self.no_wait
    }

    /// 根据参数生成日志配置
    ///
    /// 控制台输出始终开启，指定 `--log-file` 时额外写入文件
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level.into(),
            file_path: self.log_file.clone(),
            console: true,
            json_format: self.log_json,
        }
    }
}
