//! 翻译叠加层模块
//!
//! 采用清晰的模块化架构：
//! - **glossary**: 术语库读取、组合模式展开与激活过滤
//! - **masking**: 段落切片、占位符遮蔽与还原
//! - **normalization**: 译名变体规范化与韩语助词修正
//! - **core**: 引擎接口、遮蔽上下文、取消登记与流式路由
//! - **storage**: 段落译文缓存
//! - **config**: 配置管理
//! - **error**: 错误处理
//!
//! # 基本用法
//!
//! ```rust,ignore
//! use glossa_overlay::translation::{TranslationOptions, TranslationRouter};
//!
//! # async fn example(router: TranslationRouter, segments: Vec<Segment>) -> TranslationResult<()> {
//! let options = TranslationOptions::with_target("ko");
//! let summary = router
//!     .translate_stream("run-1", &segments, &options, None, None, |event| {
//!         println!("{}", event.to_json().unwrap_or_default());
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// 子模块声明
// ============================================================================

/// 配置管理模块 - 遮蔽、规范化、缓存与路由配置
pub mod config;

/// 核心模块 - 引擎接口、遮蔽上下文与流式路由
pub mod core;

/// 错误处理模块 - 统一的错误类型和处理机制
pub mod error;

/// 术语库模块 - 快照读取与条目组合
pub mod glossary;

/// 遮蔽模块 - 切片、占位符与还原
pub mod masking;

/// 数据契约 - 段落、术语、切片、事件
pub mod model;

/// 规范化模块 - 变体收敛、助词修正与区间平移
pub mod normalization;

/// 存储模块 - 段落译文缓存
pub mod storage;

/// 文本工具 - 字符分类与大小写无关查找
pub mod text;

// ============================================================================
// 核心API导出
// ============================================================================

pub use self::core::{
    build_context, prepare_masking_context, residual_source_ratio, CancellationRegistry, EngineResultStream,
    EngineStats, MaskingContext, TranslationEngine, TranslationRouter,
};

pub use self::config::{constants, ConfigManager, OverlayConfig, UnmaskedTermMode};

pub use error::{EngineStreamError, ErrorCategory, ErrorSeverity, TranslationError, TranslationResult};

pub use glossary::{GlossaryComposer, GlossaryStore, InMemoryGlossaryStore};

pub use masking::{MaskingEngine, SegmentPiecesBuilder, StandalonePolicy};

pub use model::{
    EngineResult, EngineTag, GlossaryData, GlossaryEntry, MaskedPack, MatchedTerm, Pattern, Segment,
    SegmentPieces, SegmentTranslation, StreamEventKind, TermHighlightMetadata, TermRange, TermRangeKind,
    TranslationOptions, TranslationStreamEvent, TranslationStreamSummary,
};

pub use normalization::{GrammarFixer, KoreanParticleFixer, NormalizationEngine};

pub use storage::{cache_key, create_cache_store, CacheStats, CacheStore, LruCacheStore, MemoryCacheStore};

/// 检查叠加层配置文件是否存在
pub fn config_file_exists() -> bool {
    self::config::config_file_exists()
}

/// 生成示例配置文件 `glossa-overlay.toml`
pub fn generate_example_config() -> TranslationResult<()> {
    ConfigManager::generate_example_config(constants::CONFIG_PATHS[0])?;
    tracing::info!("已生成示例配置文件: {}", constants::CONFIG_PATHS[0]);
    Ok(())
}

// ============================================================================
// 模块信息和元数据
// ============================================================================

/// 模块版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const MODULE_NAME: &str = "translation";

/// 模块信息
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub name: String,
    pub version: String,
    pub enabled: bool,
    pub features: Vec<String>,
}

/// 获取模块信息
pub fn get_module_info() -> ModuleInfo {
    ModuleInfo {
        name: MODULE_NAME.to_string(),
        version: VERSION.to_string(),
        enabled: cfg!(feature = "translation"),
        features: get_enabled_features(),
    }
}

/// 获取启用的功能
fn get_enabled_features() -> Vec<String> {
    vec![
        "glossary_composer".to_string(),
        "token_masking".to_string(),
        "name_normalization".to_string(),
        "korean_particles".to_string(),
        "streaming_router".to_string(),
        "segment_cache".to_string(),
    ]
}

/// 运行模块自检
///
/// 用一条内置术语走一遍遮蔽、原样"翻译"、还原，确认占位符能完整往返。
pub async fn self_check() -> TranslationResult<()> {
    tracing::info!("开始翻译模块自检...");

    let config = OverlayConfig::default();
    config.validate()?;
    tracing::debug!("✓ 默认配置有效");

    let term = MatchedTerm {
        key: "self-check".to_string(),
        target: "서울".to_string(),
        sources: vec![model::TermSource::new("首尔")],
        pre_mask: true,
        ..Default::default()
    };
    let store = InMemoryGlossaryStore::new(vec![term], Vec::new());
    let url = url::Url::parse("https://localhost/")
        .map_err(|e| TranslationError::InternalError(format!("自检 URL 无效: {}", e)))?;
    let segment = Segment::new("self-check", url, 0, "首尔으로");
    let ctx = prepare_masking_context(&store, &config, std::slice::from_ref(&segment), &TranslationOptions::default())
        .await;

    let (pieces, pack, _) = ctx.parts_for(&segment);
    if pack.locks.len() != 1 {
        return Err(TranslationError::InternalError("遮蔽未产生占位符".to_string()));
    }
    tracing::debug!("✓ 遮蔽正常: {}", pack.masked);

    let engine = MaskingEngine::new(&config.masking);
    let restored = engine.unmask_with_order(&pack.masked, &pieces, &pack.locks, &pack.token_entries);
    if restored.text != "서울로" {
        return Err(TranslationError::InternalError(format!("还原结果异常: {}", restored.text)));
    }
    tracing::debug!("✓ 还原与助词修正正常");

    tracing::info!("翻译模块自检完成，所有组件正常");
    Ok(())
}

/// 模块初始化
///
/// 安装 `tracing` 订阅器，级别取自 `GLOSSA_LOG_LEVEL`；重复调用不会出错。
pub fn init() {
    use crate::env::EnvVar;

    let level = crate::env::core::LogLevel::get()
        .ok()
        .and_then(|l| l.parse::<tracing::Level>().ok())
        .unwrap_or(tracing::Level::INFO);
    let _ = tracing_subscriber::fmt().with_max_level(level).with_target(false).try_init();

    tracing::info!("翻译模块 v{} 已加载", VERSION);
    tracing::debug!("启用的功能: {:?}", get_enabled_features());
}
