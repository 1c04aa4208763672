//! 配置存储模块
//!
//! 提供线程安全的配置快照存储、类型化读取和原子替换

use crate::config::duration::parse_duration;
use crate::config::loader::{load_from_file, ConfigSnapshot};
use crate::config::subscribers::SubscriberRegistry;
use crate::error::ConfigError;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// 配置存储
///
/// 持有当前配置快照和订阅者注册表。快照要么未设置（未初始化），
/// 要么指向一份完整解析的配置，读取方永远看不到解析到一半的数据。
#[derive(Debug, Default)]
pub struct ConfigStore {
    /// 当前配置快照
    snapshot: RwLock<Option<Arc<ConfigSnapshot>>>,
    /// 配置版本号，每安装一次快照加一
    version: AtomicU64,
    /// 初始化时使用的配置文件路径，重载时复用
    config_path: OnceLock<PathBuf>,
    /// 配置变更订阅者
    subscribers: Arc<SubscriberRegistry>,
}

impl ConfigStore {
    /// 创建未初始化的配置存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 初始化配置存储
    ///
    /// 幂等操作：已经安装过快照时直接返回，先到者胜出
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    ///
    /// # 返回
    /// * `Result<(), ConfigError>` - 首次加载失败时返回错误，调用方应视为致命错误
    pub fn init<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if self.is_initialized() {
            self.remember_path(path);
            return Ok(());
        }

        let snapshot = load_from_file(path)?;

        let mut current = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        if current.is_some() {
            drop(current);
            debug!("配置已由其他调用方初始化，忽略本次加载");
            self.remember_path(path);
            return Ok(());
        }
        *current = Some(Arc::new(snapshot));
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.config_path.set(path.to_path_buf());
        drop(current);

        info!("配置初始化完成: {}，版本: {}", path.display(), version);
        Ok(())
    }

    /// 快照已通过其他途径安装时，仍然记录重载路径（只记录第一次）
    fn remember_path(&self, path: &Path) {
        match self.config_path.get() {
            Some(existing) if existing != path => {
                debug!(
                    "配置路径已是 {}，忽略 {}",
                    existing.display(),
                    path.display()
                );
            }
            Some(_) => {}
            None => {
                if self.config_path.set(path.to_path_buf()).is_ok() {
                    info!("记录配置重载路径: {}", path.display());
                }
            }
        }
    }

    /// 是否已经安装了配置快照
    pub fn is_initialized(&self) -> bool {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// 初始化时使用的配置文件路径
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.get().map(PathBuf::as_path)
    }

    /// 当前配置版本号，未初始化时为 0
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// 获取当前配置快照
    ///
    /// 返回的快照在持有期间保持不变，即使期间发生了重载
    pub fn snapshot(&self) -> Option<Arc<ConfigSnapshot>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 读取配置值并解码为目标类型
    ///
    /// # 参数
    /// * `key` - 配置键
    ///
    /// # 返回
    /// * `Result<T, ConfigError>` - 未初始化、键不存在或类型不匹配时返回错误
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        let snapshot = self.snapshot().ok_or(ConfigError::NotInitialized)?;
        snapshot.decode(key).inspect_err(|e| debug!("读取配置失败: {}", e))
    }

    /// 读取任意结构的配置值，等同于 [`ConfigStore::get`]
    pub fn object<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        self.get(key)
    }

    /// 读取字符串配置，失败时返回默认值
    pub fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|_| default.to_string())
    }

    /// 读取布尔配置，失败时返回默认值
    pub fn bool(&self, key: &str, default: bool) -> bool {
        self.get(key).unwrap_or(default)
    }

    /// 读取整数配置，失败时返回默认值
    pub fn int(&self, key: &str, default: i64) -> i64 {
        self.get(key).unwrap_or(default)
    }

    /// 读取时长配置（如 "10s"、"1m30s"），失败时返回默认值
    ///
    /// 值存在但无法解析为时长时会记录警告
    pub fn duration(&self, key: &str, default: Duration) -> Duration {
        let raw: String = match self.get(key) {
            Ok(raw) => raw,
            Err(_) => return default,
        };

        match parse_duration(&raw) {
            Ok(duration) => duration,
            Err(e) => {
                warn!("无法解析配置 '{}' 的时长值 {:?}: {}", key, raw, e);
                default
            }
        }
    }

    /// 配置中是否存在该键
    pub fn contains(&self, key: &str) -> bool {
        self.snapshot()
            .is_some_and(|snapshot| snapshot.contains_key(key))
    }

    /// 当前配置中的所有键
    pub fn keys(&self) -> Vec<String> {
        self.snapshot()
            .map(|snapshot| snapshot.keys().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// 替换配置快照
    ///
    /// 在写锁内完成指针交换，释放写锁后再异步通知订阅者，
    /// 慢订阅者不会阻塞后续读取或下一次重载
    ///
    /// # 返回
    /// * `u64` - 新的版本号
    pub fn replace(&self, snapshot: ConfigSnapshot) -> u64 {
        let version = {
            let mut current = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
            *current = Some(Arc::new(snapshot));
            self.version.fetch_add(1, Ordering::SeqCst) + 1
        };

        info!("配置快照已替换，版本: {}", version);
        self.subscribers.notify_async();
        version
    }

    /// 从初始化时的路径重新加载配置并替换快照
    ///
    /// 加载失败时保留原快照不变
    pub fn reload(&self) -> Result<u64, ConfigError> {
        let path = self.config_path().ok_or(ConfigError::NotInitialized)?;
        let snapshot = load_from_file(path)?;
        Ok(self.replace(snapshot))
    }

    /// 注册配置变更订阅者，同名覆盖
    pub fn subscribe<F>(&self, name: impl Into<String>, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscribers.subscribe(name, callback);
    }

    /// 注销配置变更订阅者，不存在时什么也不做
    pub fn unsubscribe(&self, name: &str) {
        self.subscribers.unsubscribe(name);
    }

    /// 订阅者注册表
    pub fn subscribers(&self) -> &Arc<SubscriberRegistry> {
        &self.subscribers
    }
}
