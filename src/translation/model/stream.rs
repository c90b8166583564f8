//! 流式翻译的事件契约
//!
//! UI 层只依赖这里的类型：事件按 `sequence` 排序，`Final` 携带高亮区间。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::masking::TermHighlightMetadata;
use super::options::EngineTag;

/// 引擎流中的单条结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineResult {
    pub segment_id: String,
    pub text: String,
    pub engine: EngineTag,
    pub created_at: DateTime<Utc>,
}

impl EngineResult {
    pub fn new(segment_id: impl Into<String>, text: impl Into<String>, engine: EngineTag) -> Self {
        Self { segment_id: segment_id.into(), text: text.into(), engine, created_at: Utc::now() }
    }
}

/// 还原与规范化完成后的段落译文，也是缓存记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentTranslation {
    pub segment_id: String,
    pub engine: EngineTag,
    pub text: String,
    pub pre_normalized_text: Option<String>,
    /// 译文中残留的汉字比例
    pub residual_source_ratio: f64,
    pub highlight_metadata: Option<TermHighlightMetadata>,
    pub created_at: DateTime<Utc>,
}

/// 单个段落的进度载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationStreamPayload {
    pub segment_id: String,
    pub original_text: String,
    pub translated_text: Option<String>,
    pub pre_normalized_text: Option<String>,
    pub engine_id: EngineTag,
    pub sequence: u64,
    pub highlight_metadata: Option<TermHighlightMetadata>,
}

/// 段落级失败原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TranslationStreamError {
    Network,
    Cancelled,
    EngineFailure { code: Option<i32> },
    Decoding,
}

/// 事件种类
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamEventKind {
    CachedHit,
    RequestScheduled,
    Partial(TranslationStreamPayload),
    Final(TranslationStreamPayload),
    Failed { segment_id: String, error: TranslationStreamError },
    Completed,
}

/// 带时间戳的流事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationStreamEvent {
    #[serde(flatten)]
    pub kind: StreamEventKind,
    pub timestamp: DateTime<Utc>,
}

impl TranslationStreamEvent {
    pub fn now(kind: StreamEventKind) -> Self {
        Self { kind, timestamp: Utc::now() }
    }

    /// 载荷中的序号（仅 Partial/Final）
    pub fn sequence(&self) -> Option<u64> {
        match &self.kind {
            StreamEventKind::Partial(p) | StreamEventKind::Final(p) => Some(p.sequence),
            _ => None,
        }
    }

    /// 公开的 JSON 线格式
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// 一次运行的汇总
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationStreamSummary {
    pub total_count: usize,
    pub succeeded_count: usize,
    pub failed_count: usize,
    pub cached_count: usize,
}
