//! 叠加层配置管理模块
//!
//! 提供配置文件、.env、环境变量和默认值的分层加载

pub mod manager;

// 重新导出主要类型
pub use manager::{
    CacheSettings, ConfigManager, MaskingSettings, NormalizationSettings, OverlayConfig, RouterSettings,
    UnmaskedTermMode,
};

/// 配置常量
pub mod constants {
    use std::time::Duration;

    // 占位符
    pub const DEFAULT_TOKEN_PREFIX: &str = "E";
    pub const TOKEN_DELIMITER: &str = "__";
    pub const TOKEN_ID_SEPARATOR: char = '#';

    // 规范化
    pub const DEFAULT_MIN_VARIANT_CHARS: usize = 2;

    // 缓存设置
    pub const DEFAULT_CACHE_CAPACITY: usize = 2000;
    pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(86400); // 1天

    // 路由
    pub const DEFAULT_ENGINE: &str = "afm";

    // 残留原文比例的告警阈值
    pub const RESIDUAL_WARN_RATIO: f64 = 0.3;

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "glossa-overlay.toml",
        ".glossa-overlay.toml",
        "glossa-overlay.json",
        "~/.config/glossa/overlay.toml",
        "/etc/glossa/overlay.toml",
    ];
}

/// 便利函数
pub fn config_file_exists() -> bool {
    constants::CONFIG_PATHS
        .iter()
        .any(|path| std::path::Path::new(shellexpand::tilde(path).as_ref()).exists())
}

/// 加载配置，失败时回退到默认值
pub fn load_overlay_config() -> OverlayConfig {
    match ConfigManager::new() {
        Ok(manager) => manager.into_config(),
        Err(e) => {
            tracing::warn!("配置加载失败，使用默认配置: {}", e);
            OverlayConfig::default()
        }
    }
}
