//! 集成测试共用工具

#![allow(dead_code)]

use service_bootstrap::core::ServiceLogger;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

/// 记录所有日志的测试日志器
#[derive(Debug, Default)]
pub struct RecordingLogger {
    info: Mutex<Vec<String>>,
    critical: Mutex<Vec<String>>,
}

impl RecordingLogger {
    pub fn info_entries(&self) -> Vec<String> {
        self.info.lock().unwrap().clone()
    }

    pub fn critical_entries(&self) -> Vec<String> {
        self.critical.lock().unwrap().clone()
    }
}

impl ServiceLogger for RecordingLogger {
    fn info(&self, message: &str) {
        self.info.lock().unwrap().push(message.to_string());
    }

    fn critical(&self, message: &str) {
        self.critical.lock().unwrap().push(message.to_string());
    }
}

/// 在临时目录中写入配置文件
pub fn write_config(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("config.json");
    rewrite_config(&path, content);
    path
}

/// 覆盖配置文件内容
pub fn rewrite_config(path: &Path, content: &str) {
    fs::write(path, content).unwrap();
}

/// 轮询直到条件成立或超时
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
