//! 配置变更订阅者注册表
//!
//! 每次配置快照替换成功后，按名称注册的回调都会被调用一次

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error};

/// 订阅回调
pub type Subscriber = Arc<dyn Fn() + Send + Sync>;

/// 订阅者注册表
///
/// 与配置快照使用不同的锁，注册/注销不会阻塞配置读取
#[derive(Default)]
pub struct SubscriberRegistry {
    events: RwLock<HashMap<String, Subscriber>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册订阅者，同名订阅者会被覆盖
    pub fn subscribe<F>(&self, name: impl Into<String>, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let name = name.into();
        debug!("注册配置订阅者: {}", name);
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, Arc::new(callback));
    }

    /// 注销订阅者
    ///
    /// # 返回
    /// * `bool` - 订阅者是否存在；不存在时不做任何事
    pub fn unsubscribe(&self, name: &str) -> bool {
        if !self.contains(name) {
            return false;
        }
        let removed = self
            .events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some();
        if removed {
            debug!("注销配置订阅者: {}", name);
        }
        removed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 同步调用所有订阅者
    ///
    /// 先在读锁内复制回调列表，再在锁外逐个调用，回调中可以安全地注册或注销订阅者
    pub fn notify(&self) {
        let callbacks: Vec<(String, Subscriber)> = self
            .events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, callback)| (name.clone(), Arc::clone(callback)))
            .collect();

        for (name, callback) in callbacks {
            debug!("通知配置订阅者: {}", name);
            callback();
        }
    }

    /// 在后台异步调用所有订阅者
    ///
    /// 处于 tokio 运行时内时使用阻塞任务池，否则启动一个独立线程
    pub fn notify_async(self: &Arc<Self>) {
        if self.is_empty() {
            return;
        }

        let registry = Arc::clone(self);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || registry.notify());
            }
            Err(_) => {
                let spawned = std::thread::Builder::new()
                    .name("config-subscribers".to_string())
                    .spawn(move || registry.notify());
                if let Err(e) = spawned {
                    error!("启动配置订阅通知线程失败: {}", e);
                }
            }
        }
    }
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &names)
            .finish()
    }
}
