//! 错误处理集成测试
//!
//! 测试术语库故障、引擎故障与配置错误时的行为

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::BoxFuture;

use glossa_overlay::translation::config::{ConfigManager, OverlayConfig};
use glossa_overlay::translation::core::{CancellationRegistry, TranslationEngine, TranslationRouter};
use glossa_overlay::translation::error::{
    EngineStreamError, ErrorCategory, ErrorSeverity, ErrorStats, TranslationError, TranslationResult,
};
use glossa_overlay::translation::glossary::GlossaryStore;
use glossa_overlay::translation::model::{EngineTag, GlossaryData, StreamEventKind, TranslationOptions};

mod common {
    include!("common/mod.rs");
}

use common::{build_router, EventCollector, ScriptedEngine, TestDataGenerator};

/// 每次查询都失败的术语库
struct BrokenGlossaryStore;

impl GlossaryStore for BrokenGlossaryStore {
    fn fetch_data<'a>(&'a self, _full_text: &'a str) -> BoxFuture<'a, TranslationResult<GlossaryData>> {
        Box::pin(async { Err(TranslationError::GlossaryError("connection refused".to_string())) })
    }
}

/// 测试错误分类与重试判断
#[test]
fn test_error_classification() {
    let cases = vec![
        (TranslationError::ConfigError("x".into()), ErrorCategory::Configuration, ErrorSeverity::Critical, false),
        (TranslationError::GlossaryError("x".into()), ErrorCategory::Glossary, ErrorSeverity::Warning, true),
        (TranslationError::EngineError("x".into()), ErrorCategory::Engine, ErrorSeverity::Error, true),
        (TranslationError::NoAvailableEngine, ErrorCategory::Engine, ErrorSeverity::Error, true),
        (TranslationError::Cancelled("run".into()), ErrorCategory::Cancellation, ErrorSeverity::Info, false),
        (TranslationError::InternalError("x".into()), ErrorCategory::Internal, ErrorSeverity::Critical, false),
    ];

    let mut stats = ErrorStats::default();
    for (error, category, severity, retryable) in &cases {
        assert_eq!(error.category(), *category, "{}", error);
        assert_eq!(error.severity(), *severity, "{}", error);
        assert_eq!(error.is_retryable(), *retryable, "{}", error);
        stats.record_error(error);
    }

    assert_eq!(stats.total_errors, cases.len());
    assert_eq!(stats.critical_errors, 2);
    assert_eq!(stats.retryable_errors, 3);
    assert!((stats.error_rate(12) - 0.5).abs() < f64::EPSILON);
    assert!(TranslationError::Cancelled("run".into()).is_cancellation());

    println!("✅ Error classification test passed");
}

/// 测试结果流错误的展示与上下文
#[test]
fn test_stream_error_display_and_context() {
    let missing: BTreeSet<String> = ["seg-2".to_string(), "seg-1".to_string()].into_iter().collect();
    let error: TranslationError = EngineStreamError::MissingIds(missing).into();
    assert_eq!(error.category(), ErrorCategory::Engine);
    assert!(error.to_string().contains("seg-1"));

    let unexpected = TranslationError::from(EngineStreamError::UnexpectedId("ghost".into()));
    assert!(unexpected.to_string().contains("ghost"));

    let contextual = TranslationError::EngineError("timeout".to_string()).with_context("run-7");
    assert!(matches!(contextual, TranslationError::EngineError(_)));
    assert_eq!(contextual.to_string(), "翻译引擎错误: timeout (run-7)");

    let logged = TranslationError::Cancelled("run-8".to_string()).logged();
    assert!(matches!(logged, TranslationError::Cancelled(ref id) if id == "run-8"));

    println!("✅ Stream error display test passed");
}

/// 测试术语库故障时按空术语表继续翻译
#[tokio::test]
async fn test_glossary_failure_degrades_to_passthrough() {
    let engine = Arc::new(ScriptedEngine::echo(EngineTag::Afm));
    let router = TranslationRouter::new(
        vec![engine.clone() as Arc<dyn TranslationEngine>],
        Arc::new(BrokenGlossaryStore),
        None,
        OverlayConfig::default(),
    )
    .with_registry(Arc::new(CancellationRegistry::new()));

    let segments = TestDataGenerator::segments(&["我在首尔工作"]);
    let collector = EventCollector::new();
    let summary = router
        .translate_stream("broken-glossary", &segments, &TranslationOptions::default(), None, None, collector.sink())
        .await
        .expect("术语库故障不应中断翻译");

    assert_eq!(summary.succeeded_count, 1);
    assert_eq!(engine.requests()[0][0].original_text, "我在首尔工作", "没有术语时应原样发送");
    let finals = collector.finals();
    assert_eq!(finals.len(), 1);
    assert!(collector.has_completed());

    println!("✅ Glossary failure passthrough test passed");
}

/// 测试引擎故障与无可用引擎
#[tokio::test]
async fn test_engine_failures_are_reported() {
    let router = build_router(Vec::new(), Vec::new(), None);
    let segments = TestDataGenerator::segments(&["하나"]);
    let err = router
        .translate_stream("no-engine", &segments, &TranslationOptions::default(), None, None, |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, TranslationError::NoAvailableEngine));

    let engine = Arc::new(ScriptedEngine::echo(EngineTag::Afm).failing_after(0));
    let router = build_router(vec![engine], Vec::new(), None);
    let collector = EventCollector::new();
    let err = router
        .translate_stream("fail", &segments, &TranslationOptions::default(), None, None, collector.sink())
        .await
        .unwrap_err();

    assert!(matches!(err, TranslationError::EngineError(_)));
    assert!(err.is_retryable());
    assert_eq!(collector.failed_ids(), vec!["seg-0".to_string()]);
    assert!(!collector.has_completed(), "失败的运行不应发出完成事件");
    assert_eq!(collector.count_where(|k| matches!(k, StreamEventKind::Final(_))), 0);
    assert_eq!(router.stats().engine_errors.load(std::sync::atomic::Ordering::Relaxed), 1);

    println!("✅ Engine failure test passed");
}

/// 测试配置文件的加载与校验
#[test]
fn test_config_file_loading_and_validation() {
    let dir = tempfile::tempdir().unwrap();

    let toml_path = dir.path().join("overlay.toml");
    ConfigManager::generate_example_config(&toml_path).unwrap();
    let manager = ConfigManager::from_file(&toml_path).expect("生成的示例配置应可加载");
    assert_eq!(manager.get_config().masking.token_prefix, OverlayConfig::default().masking.token_prefix);

    let json_path = dir.path().join("overlay.json");
    std::fs::write(&json_path, r#"{ "cache": { "capacity": 8 } }"#).unwrap();
    let config = ConfigManager::from_file(&json_path).unwrap().into_config();
    assert_eq!(config.cache.capacity, 8);
    assert_eq!(config.normalization, OverlayConfig::default().normalization);

    let bad_prefix = dir.path().join("bad.toml");
    std::fs::write(&bad_prefix, "[masking]\ntoken_prefix = \"E_1\"\n").unwrap();
    let err = ConfigManager::from_file(&bad_prefix).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);

    let unsupported = dir.path().join("overlay.yaml");
    std::fs::write(&unsupported, "cache: {}").unwrap();
    assert!(ConfigManager::from_file(&unsupported).is_err());

    assert!(ConfigManager::from_file(dir.path().join("missing.toml")).is_err());

    println!("✅ Config loading test passed");
}
