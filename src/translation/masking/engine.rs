//! 遮蔽引擎
//!
//! 把切片结果变成送给翻译引擎的文本：需要预先遮蔽的术语换成占位符，
//! 同时登记锁信息（目标词与词尾类别）；翻译返回后再按编号顺序还原。

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use regex::Regex;

use super::spacing::{insert_spaces_around_tokens_if_isolated, nbsp_sides};
use super::tokens::{self, format_token, sorted_tokens};
use crate::translation::config::{MaskingSettings, UnmaskedTermMode};
use crate::translation::model::{
    GlossaryEntry, LockInfo, MaskedPack, Piece, Segment, SegmentPieces, TermRange, TermRangeKind,
    TokenSpacingBehavior,
};
use crate::translation::normalization::{
    apply_deltas_to_ranges, replace_with_particle_fix, shift_ranges_from, DeltaTracker, FinalSound, GrammarFixer,
    KoreanParticleFixer, ReplacementDelta,
};
use crate::translation::text::{nfkc, NBSP};

/// 还原结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnmaskedText {
    pub text: String,
    /// 还原后目标词在 `text` 中的位置
    pub ranges: Vec<TermRange>,
    /// 以输入文本坐标表示的改写增量
    pub deltas: Vec<ReplacementDelta>,
}

/// 一次遮蔽过程使用的引擎，编号计数器随引擎存在
#[derive(Debug)]
pub struct MaskingEngine {
    prefix: String,
    spacing: TokenSpacingBehavior,
    unmasked_terms: UnmaskedTermMode,
    nfkc: bool,
    next_index: AtomicUsize,
    fixer: Arc<dyn GrammarFixer>,
}

impl Default for MaskingEngine {
    fn default() -> Self {
        Self::new(&MaskingSettings::default())
    }
}

impl MaskingEngine {
    pub fn new(settings: &MaskingSettings) -> Self {
        Self {
            prefix: settings.token_prefix.clone(),
            spacing: settings.token_spacing,
            unmasked_terms: settings.unmasked_terms,
            nfkc: true,
            next_index: AtomicUsize::new(1),
            fixer: Arc::new(KoreanParticleFixer),
        }
    }

    pub fn with_spacing(mut self, spacing: TokenSpacingBehavior) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn with_nfkc(mut self, enabled: bool) -> Self {
        self.nfkc = enabled;
        self
    }

    pub fn with_fixer(mut self, fixer: Arc<dyn GrammarFixer>) -> Self {
        self.fixer = fixer;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn fixer(&self) -> Arc<dyn GrammarFixer> {
        Arc::clone(&self.fixer)
    }

    fn next_token(&self) -> String {
        format_token(&self.prefix, self.next_index.fetch_add(1, Ordering::Relaxed))
    }

    // ========================================================================
    // 遮蔽
    // ========================================================================

    /// 根据切片生成遮蔽文本、锁表与区间
    pub fn mask_from_pieces(&self, pieces: &SegmentPieces, segment: &Segment) -> MaskedPack {
        let mut out = String::with_capacity(segment.original_text.len() + 16);
        let mut locks = BTreeMap::new();
        let mut token_entries = BTreeMap::new();
        let mut masked_ranges = Vec::new();

        for (idx, piece) in pieces.pieces.iter().enumerate() {
            match piece {
                Piece::Text { text, .. } => out.push_str(text),
                Piece::Term { entry, .. } if entry.pre_mask => {
                    let token = self.next_token();
                    let (left, right) = if entry.is_appellation {
                        nbsp_sides(out.chars().last(), self.first_char_after(pieces, idx))
                    } else {
                        (false, false)
                    };
                    if left {
                        out.push(NBSP);
                    }
                    let start = out.len();
                    out.push_str(&token);
                    let end = out.len();
                    if right {
                        out.push(NBSP);
                    }

                    let sound = self.fixer.final_sound(&entry.target);
                    locks.insert(
                        token.clone(),
                        LockInfo {
                            placeholder: token.clone(),
                            target: entry.target.clone(),
                            ends_with_batchim: sound.has_batchim,
                            ends_with_rieul: sound.is_rieul,
                            is_appellation: entry.is_appellation,
                        },
                    );
                    token_entries.insert(token, entry.clone());
                    masked_ranges.push(TermRange::new(entry.clone(), start..end, TermRangeKind::Masked));
                }
                Piece::Term { entry, .. } => {
                    let start = out.len();
                    out.push_str(self.unmasked_text(entry));
                    masked_ranges.push(TermRange::new(entry.clone(), start..out.len(), TermRangeKind::Normalized));
                }
            }
        }

        if self.spacing == TokenSpacingBehavior::IsolatedSegments {
            let (spaced, deltas) = insert_spaces_around_tokens_if_isolated(&out);
            apply_deltas_to_ranges(&mut masked_ranges, &deltas);
            out = spaced;
        }

        tracing::debug!("段落 {} 遮蔽完成: {} 个占位符", segment.id, locks.len());

        MaskedPack { segment: segment.clone(), masked: out, masked_ranges, locks, token_entries }
    }

    fn unmasked_text<'a>(&self, entry: &'a GlossaryEntry) -> &'a str {
        match self.unmasked_terms {
            UnmaskedTermMode::KeepSource => &entry.source,
            UnmaskedTermMode::SubstituteTarget => &entry.target,
        }
    }

    /// 下一个片段在遮蔽文本中的首字符
    fn first_char_after(&self, pieces: &SegmentPieces, idx: usize) -> Option<char> {
        match pieces.pieces.get(idx + 1)? {
            Piece::Text { text, .. } => text.chars().next(),
            Piece::Term { entry, .. } if entry.pre_mask => Some('_'),
            Piece::Term { entry, .. } => self.unmasked_text(entry).chars().next(),
        }
    }

    // ========================================================================
    // 还原
    // ========================================================================

    /// 修复被引擎破坏的占位符；内部正则构造失败时原样返回
    pub fn normalize_damaged_tokens(&self, text: &str, locks: &BTreeMap<String, LockInfo>) -> String {
        match tokens::normalize_damaged_tokens(text, locks, &self.prefix) {
            Ok((repaired, _)) => repaired,
            Err(e) => {
                tracing::warn!("占位符修复跳过: {}", e);
                text.to_string()
            }
        }
    }

    pub fn unlock_terms_safely(&self, text: &str, locks: &BTreeMap<String, LockInfo>) -> String {
        tokens::unlock_terms_safely(text, locks)
    }

    /// 按编号顺序把占位符换回目标词，并修正其后的助词
    ///
    /// 每个占位符先从上一个命中之后找，找不到再全文找。
    /// 锁比遮蔽术语多出来的部分交给 [`Self::normalize_tokens_and_particles`]。
    pub fn unmask_with_order(
        &self,
        text: &str,
        pieces: &SegmentPieces,
        locks: &BTreeMap<String, LockInfo>,
        token_entries: &BTreeMap<String, GlossaryEntry>,
    ) -> UnmaskedText {
        if text.is_empty() || locks.is_empty() {
            return UnmaskedText { text: text.to_string(), ..Default::default() };
        }

        let mut out = if self.nfkc { nfkc(text) } else { text.to_string() };
        let ordered = sorted_tokens(locks);
        let masked_terms = pieces.masked_terms();
        let mut ranges: Vec<TermRange> = Vec::new();
        let mut tracker = DeltaTracker::new();
        let mut last_end: Option<usize> = None;
        let mut cursor = 0;

        while cursor < masked_terms.len() && cursor < ordered.len() {
            let token = ordered[cursor];
            cursor += 1;
            let Some(lock) = locks.get(token) else {
                continue;
            };

            let from = last_end.unwrap_or(0);
            let found = out
                .get(from..)
                .and_then(|tail| tail.find(token))
                .map(|i| from + i)
                .or_else(|| out.find(token));
            let Some(pos) = found else {
                tracing::debug!("占位符 {} 不在译文中", token);
                continue;
            };

            let sound = FinalSound { has_batchim: lock.ends_with_batchim, is_rieul: lock.ends_with_rieul };
            let replaced =
                replace_with_particle_fix(self.fixer.as_ref(), &out, pos..pos + token.len(), &lock.target, Some(sound));

            shift_ranges_from(&mut ranges, pos + token.len(), replaced.delta.delta);
            tracker.record_current(pos, replaced.delta.delta);
            out = replaced.text;
            last_end = Some(replaced.next);

            if let Some(entry) = token_entries.get(token).or_else(|| masked_terms.first().copied()) {
                ranges.push(TermRange::new(entry.clone(), replaced.range, TermRangeKind::Masked));
            }
        }

        let processed: HashSet<&str> = ordered[..cursor].iter().copied().collect();
        let remaining: BTreeMap<String, LockInfo> = locks
            .iter()
            .filter(|(token, _)| !processed.contains(token.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if !remaining.is_empty() {
            out = self.normalize_tokens_and_particles(&out, &remaining);
        }

        UnmaskedText { text: out, ranges, deltas: tracker.into_deltas() }
    }

    /// 把文本中所有已知占位符换成目标词并修正助词，从后往前处理
    pub fn normalize_tokens_and_particles(&self, text: &str, locks: &BTreeMap<String, LockInfo>) -> String {
        let mut alternatives: Vec<&str> = locks.keys().map(String::as_str).collect();
        if alternatives.is_empty() {
            return text.to_string();
        }
        alternatives.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        let pattern = alternatives.iter().map(|t| regex::escape(t)).collect::<Vec<_>>().join("|");
        let rx = match Regex::new(&pattern) {
            Ok(rx) => rx,
            Err(e) => {
                tracing::warn!("占位符交替式构造失败: {}", e);
                return text.to_string();
            }
        };

        let mut out = if self.nfkc { nfkc(text) } else { text.to_string() };
        let matches: Vec<std::ops::Range<usize>> = rx.find_iter(&out).map(|m| m.range()).collect();
        for range in matches.into_iter().rev() {
            let Some(lock) = locks.get(&out[range.clone()]) else {
                continue;
            };
            let sound = FinalSound { has_batchim: lock.ends_with_batchim, is_rieul: lock.ends_with_rieul };
            out = replace_with_particle_fix(self.fixer.as_ref(), &out, range, &lock.target, Some(sound)).text;
        }
        out
    }

    /// 还原没有产出区间时，直接在文本里按顺序定位各遮蔽术语的目标词
    pub fn map_masked_terms(pieces: &SegmentPieces, text: &str) -> Vec<TermRange> {
        let mut ranges = Vec::new();
        let mut from = 0;
        for entry in pieces.masked_terms() {
            if entry.target.is_empty() {
                continue;
            }
            let found = text
                .get(from..)
                .and_then(|tail| tail.find(entry.target.as_str()))
                .map(|i| from + i)
                .or_else(|| text.find(entry.target.as_str()));
            if let Some(start) = found {
                let end = start + entry.target.len();
                ranges.push(TermRange::new(entry.clone(), start..end, TermRangeKind::Masked));
                from = end;
            }
        }
        ranges
    }
}
