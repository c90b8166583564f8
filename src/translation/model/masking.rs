//! 遮蔽与高亮相关的数据契约

use std::collections::BTreeMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::glossary::GlossaryEntry;
use super::segment::Segment;

/// 区间类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TermRangeKind {
    Masked,
    Normalized,
}

/// 术语在某个字符串中的位置（字节区间）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermRange {
    pub entry: GlossaryEntry,
    pub range: Range<usize>,
    pub kind: TermRangeKind,
}

impl TermRange {
    pub fn new(entry: GlossaryEntry, range: Range<usize>, kind: TermRangeKind) -> Self {
        Self { entry, range, kind }
    }

    /// 取出区间覆盖的文本
    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.get(self.range.clone())
    }
}

/// UI 高亮用的区间集合
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermHighlightMetadata {
    pub original_term_ranges: Vec<TermRange>,
    pub final_term_ranges: Vec<TermRange>,
    pub pre_normalized_term_ranges: Option<Vec<TermRange>>,
}

/// 占位符的语法元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub placeholder: String,
    pub target: String,
    pub ends_with_batchim: bool,
    pub ends_with_rieul: bool,
    pub is_appellation: bool,
}

/// 单个段落的遮蔽结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskedPack {
    pub segment: Segment,
    pub masked: String,
    pub masked_ranges: Vec<TermRange>,
    pub locks: BTreeMap<String, LockInfo>,
    pub token_entries: BTreeMap<String, GlossaryEntry>,
}

/// 规范化回退：组合条目找不到时改用其组成术语
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackTerm {
    pub term_key: String,
    pub target: String,
    pub variants: Vec<String>,
}

/// 一个规范译名及其变体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameGlossary {
    pub target: String,
    pub variants: Vec<String>,
    pub expected_count: usize,
    pub fallback_terms: Option<Vec<FallbackTerm>>,
}
