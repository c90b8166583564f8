//! 翻译模块统一错误处理
//!
//! 组件内部可恢复的情况（变体未命中、术语被停用、模板缺槽）在边界处吸收，
//! 只有引擎流契约违规与取消会穿过路由器的公开边界。

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use thiserror::Error;

/// 引擎结果流契约错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineStreamError {
    /// 返回了未请求的段落，或同一段落重复返回
    #[error("unexpected segment id: {0}")]
    UnexpectedId(String),

    /// 流结束时仍有段落未返回
    #[error("missing segment ids: {0:?}")]
    MissingIds(BTreeSet<String>),
}

/// 翻译错误类型
#[derive(Error, Debug, Clone)]
pub enum TranslationError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 输入验证错误
    #[error("输入无效: {0}")]
    InvalidInput(String),

    /// 缓存错误
    #[error("缓存错误: {0}")]
    CacheError(String),

    /// 术语库读取错误
    #[error("术语库错误: {0}")]
    GlossaryError(String),

    /// 翻译引擎错误
    #[error("翻译引擎错误: {0}")]
    EngineError(String),

    /// 引擎结果流违反契约
    #[error("引擎结果流错误: {0}")]
    EngineStream(EngineStreamError),

    /// 没有可用引擎
    #[error("没有可用的翻译引擎")]
    NoAvailableEngine,

    /// 运行被取消
    #[error("运行已取消: {0}")]
    Cancelled(String),

    /// 解析错误
    #[error("解析错误: {0}")]
    ParseError(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerializationError(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl TranslationError {
    /// 换用其他引擎或稍后重试可能成功
    pub fn is_retryable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Engine | ErrorCategory::Glossary | ErrorCategory::Cache)
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, TranslationError::Cancelled(_))
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Configuration | ErrorCategory::Internal => ErrorSeverity::Critical,
            ErrorCategory::Cache | ErrorCategory::Glossary => ErrorSeverity::Warning,
            ErrorCategory::Input | ErrorCategory::Cancellation => ErrorSeverity::Info,
            ErrorCategory::Engine | ErrorCategory::Parsing | ErrorCategory::Serialization => ErrorSeverity::Error,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        use TranslationError::*;
        match self {
            ConfigError(_) => ErrorCategory::Configuration,
            InvalidInput(_) => ErrorCategory::Input,
            CacheError(_) => ErrorCategory::Cache,
            GlossaryError(_) => ErrorCategory::Glossary,
            EngineError(_) | EngineStream(_) | NoAvailableEngine => ErrorCategory::Engine,
            Cancelled(_) => ErrorCategory::Cancellation,
            ParseError(_) => ErrorCategory::Parsing,
            SerializationError(_) => ErrorCategory::Serialization,
            InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// 文本类错误携带的消息；结构化的变体返回 `None`
    fn message_mut(&mut self) -> Option<&mut String> {
        use TranslationError::*;
        match self {
            ConfigError(m) | InvalidInput(m) | CacheError(m) | GlossaryError(m) | EngineError(m) | Cancelled(m)
            | ParseError(m) | SerializationError(m) | InternalError(m) => Some(m),
            EngineStream(_) | NoAvailableEngine => None,
        }
    }

    /// 在消息后追加上下文，变体保持不变
    pub fn with_context<T: fmt::Display>(mut self, context: T) -> Self {
        if let Some(message) = self.message_mut() {
            message.push_str(&format!(" ({})", context));
        }
        self
    }

    /// 按严重程度写日志后原样返回
    pub fn logged(self) -> Self {
        match self.severity() {
            ErrorSeverity::Info => tracing::info!("{}", self),
            ErrorSeverity::Warning => tracing::warn!("{}", self),
            ErrorSeverity::Error | ErrorSeverity::Critical => tracing::error!(severity = ?self.severity(), "{}", self),
        }
        self
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Cache,
    Glossary,
    Engine,
    Cancellation,
    Parsing,
    Serialization,
    Internal,
}

impl From<EngineStreamError> for TranslationError {
    fn from(error: EngineStreamError) -> Self {
        TranslationError::EngineStream(error)
    }
}

impl From<std::io::Error> for TranslationError {
    fn from(error: std::io::Error) -> Self {
        TranslationError::ConfigError(format!("IO错误: {}", error))
    }
}

impl From<serde_json::Error> for TranslationError {
    fn from(error: serde_json::Error) -> Self {
        TranslationError::SerializationError(format!("JSON序列化错误: {}", error))
    }
}

impl From<toml::de::Error> for TranslationError {
    fn from(error: toml::de::Error) -> Self {
        TranslationError::ParseError(format!("TOML解析错误: {}", error))
    }
}

impl From<toml::ser::Error> for TranslationError {
    fn from(error: toml::ser::Error) -> Self {
        TranslationError::SerializationError(format!("TOML序列化错误: {}", error))
    }
}

impl From<config::ConfigError> for TranslationError {
    fn from(error: config::ConfigError) -> Self {
        TranslationError::ConfigError(format!("加载失败: {}", error))
    }
}

impl From<regex::Error> for TranslationError {
    fn from(error: regex::Error) -> Self {
        TranslationError::InternalError(format!("正则表达式错误: {}", error))
    }
}

impl From<crate::env::EnvError> for TranslationError {
    fn from(error: crate::env::EnvError) -> Self {
        TranslationError::ConfigError(error.to_string())
    }
}

/// 错误结果类型别名
pub type TranslationResult<T> = Result<T, TranslationError>;

/// 按类别与严重程度累计错误
#[derive(Debug, Clone, Default)]
pub struct ErrorStats {
    pub total_errors: usize,
    pub by_category: HashMap<ErrorCategory, usize>,
    pub by_severity: HashMap<ErrorSeverity, usize>,
    pub retryable_errors: usize,
    pub critical_errors: usize,
}

impl ErrorStats {
    pub fn record_error(&mut self, error: &TranslationError) {
        let severity = error.severity();
        self.total_errors += 1;
        *self.by_category.entry(error.category()).or_default() += 1;
        *self.by_severity.entry(severity).or_default() += 1;
        self.retryable_errors += usize::from(error.is_retryable());
        self.critical_errors += usize::from(severity == ErrorSeverity::Critical);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// 相对于总操作数的错误比例
    pub fn error_rate(&self, total_operations: usize) -> f64 {
        match total_operations {
            0 => 0.0,
            n => self.total_errors as f64 / n as f64,
        }
    }
}
