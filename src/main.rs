//! Service Bootstrap 主程序入口
//!
//! 单实例守护进程：加载 JSON 配置，监听 SIGUSR2 热重载，等待 SIGINT/SIGTERM 后停止

use anyhow::{Context, Result};
use service_bootstrap::cli::{report_fatal, Application, Args};
use service_bootstrap::logging::LoggingSystem;
use tracing::info;

fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse_args();

    // 初始化日志系统
    let _logging_system =
        LoggingSystem::setup_logging(args.log_config()).context("初始化日志系统失败")?;

    info!("Service Bootstrap v{} 启动", service_bootstrap::VERSION);

    let app = Application::new(args);
    if let Err(e) = app.init_config() {
        std::process::exit(report_fatal(&e));
    }

    // 运行时的工作线程数取决于校验后的服务描述
    let mut runner = app.build_runner();
    let runtime = match runner.validate().and_then(|service| service.build_runtime()) {
        Ok(runtime) => runtime,
        Err(e) => std::process::exit(report_fatal(&e.into())),
    };

    if let Err(e) = runtime.block_on(app.serve(&mut runner)) {
        std::process::exit(report_fatal(&e));
    }

    Ok(())
}
