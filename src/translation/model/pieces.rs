//! 段落切分结果

use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::glossary::GlossaryEntry;
use super::masking::{TermRange, TermRangeKind};

/// 文本片段或命中的术语片段，区间为原文的字节区间
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Piece {
    Text { text: String, range: Range<usize> },
    Term { entry: GlossaryEntry, range: Range<usize> },
}

impl Piece {
    pub fn range(&self) -> &Range<usize> {
        match self {
            Piece::Text { range, .. } | Piece::Term { range, .. } => range,
        }
    }

    pub fn entry(&self) -> Option<&GlossaryEntry> {
        match self {
            Piece::Term { entry, .. } => Some(entry),
            Piece::Text { .. } => None,
        }
    }

    pub fn is_term(&self) -> bool {
        matches!(self, Piece::Term { .. })
    }
}

/// 一个段落原文的有序分解，片段区间连续、不重叠且恰好覆盖原文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentPieces {
    pub segment_id: String,
    pub original_text: String,
    pub pieces: Vec<Piece>,
}

impl SegmentPieces {
    /// 没有任何术语命中的分解
    pub fn passthrough(segment_id: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let pieces = if text.is_empty() {
            Vec::new()
        } else {
            vec![Piece::Text { range: 0..text.len(), text: text.clone() }]
        };
        Self { segment_id: segment_id.into(), original_text: text, pieces }
    }

    /// 全部命中的条目（按出现顺序，可能重复）
    pub fn detected_terms(&self) -> Vec<&GlossaryEntry> {
        self.pieces.iter().filter_map(Piece::entry).collect()
    }

    /// 需要遮蔽的条目
    pub fn masked_terms(&self) -> Vec<&GlossaryEntry> {
        self.pieces.iter().filter_map(Piece::entry).filter(|e| e.pre_mask).collect()
    }

    /// 只做事后规范化的条目
    pub fn unmasked_terms(&self) -> Vec<&GlossaryEntry> {
        self.pieces.iter().filter_map(Piece::entry).filter(|e| !e.pre_mask).collect()
    }

    /// 原文中的术语区间，`pre_mask` 为 `Some` 时按遮蔽标记过滤
    pub fn term_ranges(&self, pre_mask: Option<bool>) -> Vec<TermRange> {
        self.pieces
            .iter()
            .filter_map(|piece| match piece {
                Piece::Term { entry, range } if pre_mask.map_or(true, |m| entry.pre_mask == m) => {
                    let kind = if entry.pre_mask { TermRangeKind::Masked } else { TermRangeKind::Normalized };
                    Some(TermRange { entry: entry.clone(), range: range.clone(), kind })
                }
                _ => None,
            })
            .collect()
    }

    /// 按顺序拼接所有片段区间，应当等于原文
    pub fn reconstruct(&self) -> String {
        self.pieces
            .iter()
            .filter_map(|p| self.original_text.get(p.range().clone()))
            .collect()
    }

    /// 检查覆盖不变式
    pub fn covers_original(&self) -> bool {
        let mut cursor = 0;
        for piece in &self.pieces {
            let range = piece.range();
            if range.start != cursor || range.end <= range.start {
                return false;
            }
            cursor = range.end;
        }
        cursor == self.original_text.len()
    }
}
