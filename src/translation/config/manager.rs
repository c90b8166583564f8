//! 配置管理器
//!
//! 提供统一的配置接口，支持文件配置、环境变量和默认值

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants;
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::masking::StandalonePolicy;
use crate::translation::model::{EngineTag, TokenSpacingBehavior};

/// 不遮蔽术语在送给引擎前的写法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmaskedTermMode {
    /// 保留原文，由引擎翻译后再规范化
    #[default]
    KeepSource,
    /// 直接替换为规范译文
    SubstituteTarget,
}

/// 遮蔽配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MaskingSettings {
    pub token_prefix: String,
    pub token_spacing: TokenSpacingBehavior,
    pub parallel: bool,
    pub unmasked_terms: UnmaskedTermMode,
    pub standalone_policy: StandalonePolicy,
}

impl Default for MaskingSettings {
    fn default() -> Self {
        Self {
            token_prefix: constants::DEFAULT_TOKEN_PREFIX.to_string(),
            token_spacing: TokenSpacingBehavior::Disabled,
            parallel: true,
            unmasked_terms: UnmaskedTermMode::default(),
            standalone_policy: StandalonePolicy::default(),
        }
    }
}

/// 规范化配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct NormalizationSettings {
    pub min_variant_chars: usize,
    pub nfkc: bool,
}

impl Default for NormalizationSettings {
    fn default() -> Self {
        Self { min_variant_chars: constants::DEFAULT_MIN_VARIANT_CHARS, nfkc: true }
    }
}

/// 缓存配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub capacity: usize,
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: constants::DEFAULT_CACHE_CAPACITY,
            ttl_secs: constants::DEFAULT_CACHE_TTL.as_secs(),
        }
    }
}

/// 路由配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterSettings {
    pub yield_between_events: bool,
    pub default_engine: EngineTag,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self { yield_between_events: true, default_engine: EngineTag::Afm }
    }
}

/// 叠加层配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub masking: MaskingSettings,
    pub normalization: NormalizationSettings,
    pub cache: CacheSettings,
    pub router: RouterSettings,
}

impl OverlayConfig {
    /// 验证配置
    pub fn validate(&self) -> TranslationResult<()> {
        let prefix = &self.masking.token_prefix;
        if prefix.is_empty() {
            return Err(TranslationError::ConfigError("占位符前缀不能为空".to_string()));
        }
        if prefix.chars().any(|c| c == '_' || c == '#' || c.is_ascii_digit() || c.is_whitespace()) {
            return Err(TranslationError::ConfigError(format!(
                "占位符前缀不能包含下划线、井号、数字或空白: {}",
                prefix
            )));
        }

        if self.normalization.min_variant_chars == 0 {
            return Err(TranslationError::ConfigError("最短变体长度不能为0".to_string()));
        }

        if self.cache.enabled && self.cache.capacity == 0 {
            return Err(TranslationError::ConfigError("启用缓存时缓存容量不能为0".to_string()));
        }

        Ok(())
    }

    /// 应用环境变量覆盖，只处理显式设置的变量
    pub fn apply_env_overrides(&mut self) -> TranslationResult<()> {
        use crate::env::{cache, masking, normalization, router, EnvVar};

        if let Some(prefix) = masking::TokenPrefix::get_explicit() {
            self.masking.token_prefix = prefix?;
        }

        if let Some(spacing) = masking::TokenSpacing::get_explicit() {
            self.masking.token_spacing = spacing?.parse()?;
        }

        if let Some(parallel) = masking::ParallelMasking::get_explicit() {
            self.masking.parallel = parallel?;
        }

        if let Some(min_chars) = normalization::MinVariantChars::get_explicit() {
            self.normalization.min_variant_chars = min_chars?;
        }

        // 缓存相关环境变量
        if let Some(enabled) = cache::Enabled::get_explicit() {
            self.cache.enabled = enabled?;
        }

        if let Some(capacity) = cache::Capacity::get_explicit() {
            self.cache.capacity = capacity?;
        }

        if let Some(ttl) = cache::Ttl::get_explicit() {
            self.cache.ttl_secs = ttl?.as_secs();
        }

        if let Some(engine) = router::DefaultEngine::get_explicit() {
            let engine = engine?;
            tracing::info!("环境变量覆盖默认引擎: {}", engine);
            self.router.default_engine = engine.parse().unwrap_or(EngineTag::Unknown(engine));
        }

        if let Some(yield_events) = router::YieldBetweenEvents::get_explicit() {
            self.router.yield_between_events = yield_events?;
        }

        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }
}

/// 配置管理器
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: OverlayConfig,
}

impl ConfigManager {
    /// 创建新的配置管理器
    pub fn new() -> TranslationResult<Self> {
        let mut config = Self::load_config()?;
        config.apply_env_overrides()?;
        config.validate()?;

        Ok(Self { config })
    }

    /// 从指定文件创建，仍然应用环境变量覆盖
    pub fn from_file(path: impl AsRef<Path>) -> TranslationResult<Self> {
        let mut config = Self::load_from_file(path.as_ref())?;
        config.apply_env_overrides()?;
        config.validate()?;

        Ok(Self { config })
    }

    /// 由现成配置创建
    pub fn from_config(config: OverlayConfig) -> TranslationResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// 获取配置
    pub fn get_config(&self) -> &OverlayConfig {
        &self.config
    }

    pub fn into_config(self) -> OverlayConfig {
        self.config
    }

    /// 查找并加载配置文件
    fn load_config() -> TranslationResult<OverlayConfig> {
        // 首先尝试加载 .env 文件
        Self::load_dotenv();

        for path in constants::CONFIG_PATHS {
            let expanded_path = shellexpand::tilde(path);
            let candidate = Path::new(expanded_path.as_ref());
            if candidate.exists() {
                tracing::info!("加载配置文件: {}", expanded_path);
                return Self::load_from_file(candidate);
            }
        }

        tracing::info!("未找到配置文件，使用默认配置");
        Ok(OverlayConfig::default())
    }

    /// 从指定文件加载配置，格式由扩展名决定
    fn load_from_file(path: &Path) -> TranslationResult<OverlayConfig> {
        let format = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => config::FileFormat::Json,
            Some("toml") | None => config::FileFormat::Toml,
            Some(other) => {
                return Err(TranslationError::ConfigError(format!("不支持的配置文件格式: {}", other)));
            }
        };

        let source = config::File::from(path).format(format).required(true);
        let settings = config::Config::builder().add_source(source).build()?;
        Ok(settings.try_deserialize::<OverlayConfig>()?)
    }

    /// 加载 .env 文件
    fn load_dotenv() {
        let env_files = [".env.local", ".env.development", ".env.production", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }

    /// 生成示例配置文件
    pub fn generate_example_config(path: impl AsRef<Path>) -> TranslationResult<()> {
        let content = toml::to_string_pretty(&OverlayConfig::default())?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| TranslationError::ConfigError(format!("写入配置文件失败: {}", e)))?;

        Ok(())
    }
}
