//! 配置加载器实现
//!
//! 将 JSON 配置文件解析为不可变的配置快照，值保留原始 JSON 文本，读取时再按需解码

use crate::error::ConfigError;
use serde::de::DeserializeOwned;
use serde_json::value::RawValue;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// 配置快照
///
/// 顶层键到原始 JSON 值的映射。快照一经创建就不再修改，重载时整体替换
#[derive(Debug, Default)]
pub struct ConfigSnapshot {
    values: HashMap<String, Box<RawValue>>,
}

impl ConfigSnapshot {
    /// 从 JSON 字节解析快照
    ///
    /// 文档必须是一个 JSON 对象，值可以是任意 JSON
    pub fn from_slice(content: &[u8]) -> Result<Self, serde_json::Error> {
        let values: HashMap<String, Box<RawValue>> = serde_json::from_slice(content)?;
        Ok(Self { values })
    }

    /// 将指定键的值解码为目标类型
    ///
    /// # 参数
    /// * `key` - 配置键
    ///
    /// # 返回
    /// * `Result<T, ConfigError>` - 键不存在时返回 `KeyNotFound`，类型不匹配时返回 `Decode`
    pub fn decode<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        let raw = self.values.get(key).ok_or_else(|| ConfigError::KeyNotFound {
            key: key.to_string(),
        })?;

        serde_json::from_str(raw.get()).map_err(|source| ConfigError::Decode {
            key: key.to_string(),
            source,
        })
    }

    /// 获取原始 JSON 文本
    pub fn raw(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|raw| raw.get())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// 所有键（无序）
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// 从文件加载配置快照
///
/// 纯解析操作，不修改任何存储状态
///
/// # 参数
/// * `path` - 配置文件路径
///
/// # 返回
/// * `Result<ConfigSnapshot, ConfigError>` - 读取失败返回 `Read`，格式错误返回 `Parse`
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<ConfigSnapshot, ConfigError> {
    let path = path.as_ref();

    let content = std::fs::read(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let snapshot = ConfigSnapshot::from_slice(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    info!("成功加载配置文件: {}", path.display());
    debug!("配置键数量: {}", snapshot.len());

    Ok(snapshot)
}
