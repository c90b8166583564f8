//! 多轮改写之间的偏移量换算
//!
//! 每次把一段文本替换成另一段，都会让其后的偏移量整体移动。
//! 这里用显式的增量列表记录改写历史，再把旧文本上的区间映射到新文本。

use serde::{Deserialize, Serialize};

use crate::translation::model::TermRange;

/// 一次替换造成的长度变化，`offset` 为替换起点（替换前文本中的字节偏移）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementDelta {
    pub offset: usize,
    pub delta: isize,
}

impl ReplacementDelta {
    pub fn new(offset: usize, delta: isize) -> Self {
        Self { offset, delta }
    }

    /// 由替换前后的总长度推算增量
    pub fn between(offset: usize, old_len: usize, new_len: usize) -> Self {
        Self { offset, delta: new_len as isize - old_len as isize }
    }
}

/// 把旧偏移映射到新偏移：累加所有起点严格小于它的增量
pub fn shift_offset(offset: usize, deltas: &[ReplacementDelta]) -> Option<usize> {
    let shift: isize = deltas.iter().filter(|d| d.offset < offset).map(|d| d.delta).sum();
    usize::try_from(offset as isize + shift).ok()
}

/// 把旧文本上的区间整体搬到 `final_text` 上，失效的区间直接丢弃
pub fn translate_ranges(ranges: &[TermRange], deltas: &[ReplacementDelta], final_text: &str) -> Vec<TermRange> {
    if deltas.is_empty() {
        return ranges
            .iter()
            .filter(|r| final_text.get(r.range.clone()).is_some())
            .cloned()
            .collect();
    }

    ranges
        .iter()
        .filter_map(|r| {
            let start = shift_offset(r.range.start, deltas)?;
            let end = shift_offset(r.range.end, deltas)?;
            if end < start || final_text.get(start..end).is_none() {
                tracing::debug!("丢弃失效区间: {:?} -> {}..{}", r.range, start, end);
                return None;
            }
            Some(TermRange { entry: r.entry.clone(), range: start..end, kind: r.kind })
        })
        .collect()
}

/// 同一文本上的就地改写记录器
///
/// 增量一律以改写前的原始坐标保存，替换可以按任意顺序发生，
/// 结果可以直接交给 [`translate_ranges`]。
#[derive(Debug, Default, Clone)]
pub struct DeltaTracker {
    deltas: Vec<ReplacementDelta>,
}

impl DeltaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次以原始坐标表示的改写
    pub fn record(&mut self, delta: ReplacementDelta) {
        if delta.delta != 0 {
            self.deltas.push(delta);
        }
    }

    /// 记录一次发生在当前文本 `pos` 处的改写，先换算回原始坐标
    pub fn record_current(&mut self, pos: usize, delta: isize) {
        let offset = self.original_offset(pos);
        self.record(ReplacementDelta::new(offset, delta));
    }

    /// 当前文本中的偏移对应到原始文本的位置
    pub fn original_offset(&self, pos: usize) -> usize {
        let mut sorted = self.deltas.clone();
        sorted.sort_by_key(|d| d.offset);
        let mut acc: isize = 0;
        for d in sorted {
            if (d.offset as isize + acc) < pos as isize {
                acc += d.delta;
            } else {
                break;
            }
        }
        (pos as isize - acc).max(0) as usize
    }

    pub fn deltas(&self) -> &[ReplacementDelta] {
        &self.deltas
    }

    pub fn into_deltas(self) -> Vec<ReplacementDelta> {
        self.deltas
    }

    /// 所有已记录增量之和
    pub fn total(&self) -> isize {
        self.deltas.iter().map(|d| d.delta).sum()
    }
}

/// 把起点不早于 `from` 的区间平移 `delta` 字节
pub fn shift_ranges_from(ranges: &mut [TermRange], from: usize, delta: isize) {
    if delta == 0 {
        return;
    }
    for r in ranges.iter_mut().filter(|r| r.range.start >= from) {
        let start = (r.range.start as isize + delta).max(0) as usize;
        let end = (r.range.end as isize + delta).max(0) as usize;
        r.range = start..end;
    }
}

/// 按偏移从大到小依次平移，`deltas` 与 `ranges` 使用同一坐标
pub fn apply_deltas_to_ranges(ranges: &mut [TermRange], deltas: &[ReplacementDelta]) {
    let mut sorted = deltas.to_vec();
    sorted.sort_by(|a, b| b.offset.cmp(&a.offset));
    for d in sorted {
        shift_ranges_from(ranges, d.offset, d.delta);
    }
}
