//! 配置管理
//!
//! 配置按以下顺序合并：结构体默认值、TOML配置文件、`AUTOMATION__` 前缀的环境变量。
//! 每个配置段都提供 `validate()`，加载完成后统一校验。
//!
//! ```rust,no_run
//! use automation_core::config::AppConfig;
//!
//! let config = AppConfig::load(Some("config/automation.toml")).unwrap();
//! println!("API监听地址: {}", config.api.bind_address);
//! ```

pub mod models;

pub use models::*;
