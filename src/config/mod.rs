//! 配置管理模块
//!
//! 提供 JSON 配置解析、并发安全的配置存储和信号触发的热重载功能

pub mod duration;
pub mod loader;
pub mod reload;
pub mod store;
pub mod subscribers;

// 重新导出主要类型
pub use duration::parse_duration;
pub use loader::{load_from_file, ConfigSnapshot};
pub use reload::{ReloadHandle, ReloadStats, ReloadTrigger};
pub use store::ConfigStore;
pub use subscribers::{Subscriber, SubscriberRegistry};
