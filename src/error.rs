//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use crate::core::ServiceState;
use std::path::PathBuf;
use thiserror::Error;

/// Service Bootstrap 的主要错误类型
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// PID 文件相关错误
    #[error("PID文件错误: {0}")]
    Pid(#[from] PidError),

    /// 服务生命周期相关错误
    #[error("服务错误: {0}")]
    Service(#[from] ServiceError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件读取失败
    #[error("无法读取配置文件 {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 配置文件不是合法的 JSON 对象
    #[error("无法解析配置文件 {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// 配置中不存在该键
    #[error("配置中不存在键 '{key}'")]
    KeyNotFound { key: String },

    /// 配置值无法解码为请求的类型
    #[error("无法解码配置值 '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// 配置存储尚未初始化
    #[error("配置尚未初始化")]
    NotInitialized,
}

/// PID 文件错误类型
#[derive(Error, Debug)]
pub enum PidError {
    /// 无法确定 PID 文件路径
    #[error("PID文件路径不能为空")]
    BlankPath,

    /// 无法创建 PID 文件所在目录
    #[error("无法创建目录 {path}: {source}")]
    DirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 无法打开 PID 文件
    #[error("无法打开PID文件 {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// PID 文件中记录的进程仍然存活
    #[error("服务已在运行 (PID: {pid}, PID文件: {path})")]
    AlreadyRunning { pid: u32, path: PathBuf },

    /// PID 文件已被其他进程锁定
    #[error("服务已在运行, PID文件已被锁定: {path}")]
    LockHeld {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 写入 PID 失败
    #[error("无法写入PID文件 {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PidError {
    /// 是否表示"另一个实例正在运行"
    ///
    /// 这不是崩溃，而是合法的互斥结果，调用方通常打印提示后退出
    pub fn is_already_running(&self) -> bool {
        matches!(self, Self::AlreadyRunning { .. } | Self::LockHeld { .. })
    }
}

/// 服务生命周期错误类型
#[derive(Error, Debug)]
pub enum ServiceError {
    /// 未提供启动回调
    #[error("未设置启动回调 'start'")]
    MissingStart,

    /// 服务已经启动过
    #[error("服务已启动, 当前状态: {state}")]
    AlreadyStarted { state: ServiceState },

    /// 服务未处于运行状态
    #[error("服务未在运行, 当前状态: {state}")]
    NotRunning { state: ServiceState },

    /// 单实例检查失败
    #[error(transparent)]
    Pid(#[from] PidError),

    /// 信号处理器注册失败
    #[error("注册信号处理器失败: {0}")]
    Signal(#[source] std::io::Error),

    /// 启动线程创建失败
    #[error("创建启动线程失败: {0}")]
    StartThread(#[source] std::io::Error),

    /// 运行时创建失败
    #[error("创建运行时失败: {0}")]
    Runtime(#[source] std::io::Error),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, BootstrapError>;
