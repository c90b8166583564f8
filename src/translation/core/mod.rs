//! 翻译核心模块
//!
//! 把术语组合、切片、遮蔽、引擎调用、还原与规范化串成一次流式运行。
//!
//! ## 架构设计
//!
//! - **引擎层** (`engine.rs`): 翻译引擎接口与调用统计
//! - **上下文层** (`context.rs`): 与引擎无关的遮蔽上下文，可跨引擎复用
//! - **取消层** (`cancellation.rs`): 按运行 ID 登记的取消句柄
//! - **路由层** (`router.rs`): 缓存分流、事件发出、结果还原与结束检查
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use glossa_overlay::translation::core::TranslationRouter;
//!
//! let router = TranslationRouter::new(engines, glossary_store, cache, config);
//! let context = router.prepare_masking_context(&segments, &options).await;
//! let summary = router
//!     .translate_stream("run-1", &segments, &options, None, Some(&context), |event| ui.push(event))
//!     .await?;
//! println!("成功 {} 段，缓存 {} 段", summary.succeeded_count, summary.cached_count);
//! ```
//!
//! ## 模块依赖关系
//!
//! ```text
//! TranslationRouter (router.rs)
//!     ├── MaskingContext (context.rs)
//!     │       ├── GlossaryComposer (glossary/composer.rs)
//!     │       ├── SegmentPiecesBuilder (masking/pieces.rs)
//!     │       └── MaskingEngine (masking/engine.rs)
//!     ├── NormalizationEngine (normalization/engine.rs)
//!     ├── CancellationRegistry (cancellation.rs)
//!     ├── CacheStore (storage/cache.rs)
//!     └── TranslationEngine (engine.rs)
//! ```

pub mod cancellation;
pub mod context;
pub mod engine;
pub mod router;

pub use cancellation::{CancellationHandle, CancellationRegistry};
pub use context::{build_context, prepare_masking_context, MaskingContext};
pub use engine::{EngineResultStream, EngineStats, TranslationEngine};
pub use router::{residual_source_ratio, TranslationRouter};
