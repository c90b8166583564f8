//! 规范化引擎：把译文里的变体写法统一成规范译名
//!
//! 处理分四步：
//! 1. 按片段顺序逐个匹配（规范写法或变体），从上一个命中之后找；
//! 2. 第一步没找到的组合条目改试组成术语；
//! 3. 仍未处理的译名走一次全文交替式替换；
//! 4. 对已命中过的变体做一轮扫尾，跳过所有已定稿的区间。
//!
//! 所有区间都按字节计，`pre_normalized_ranges` 指向 NFKC 之后、改写之前的文本。

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ops::Range;
use std::sync::Arc;

use regex::Regex;

use super::particles::{replace_with_particle_fix, GrammarFixer, KoreanParticleFixer};
use super::ranges::{DeltaTracker, ReplacementDelta};
use crate::translation::config::NormalizationSettings;
use crate::translation::model::{GlossaryEntry, NameGlossary, Piece, SegmentPieces, TermRange, TermRangeKind};
use crate::translation::text::{find_all_case_insensitive, find_case_insensitive, nfkc};

/// 规范化结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedText {
    pub text: String,
    pub ranges: Vec<TermRange>,
    /// 改写前文本（即 `pre_normalized_text`）上的区间
    pub pre_normalized_ranges: Vec<TermRange>,
    pub pre_normalized_text: String,
    /// 以 `pre_normalized_text` 坐标表示的改写增量
    pub deltas: Vec<ReplacementDelta>,
}

/// 一次规范化的工作状态
struct Rewrite<'f> {
    fixer: &'f dyn GrammarFixer,
    out: String,
    ranges: Vec<TermRange>,
    pre: Vec<TermRange>,
    protected: Vec<Range<usize>>,
    tracker: DeltaTracker,
    matched: BTreeMap<String, BTreeSet<String>>,
    changed: bool,
}

impl<'f> Rewrite<'f> {
    fn overlaps_protected(&self, r: &Range<usize>) -> bool {
        self.protected.iter().any(|p| p.start < r.end && r.start < p.end)
    }

    fn record_variant(&mut self, target: &str, variant: &str) {
        if !variant.is_empty() {
            self.matched.entry(target.to_string()).or_default().insert(variant.to_string());
        }
    }

    /// 把 `range` 换成 `replacement` 并修正助词，返回下次搜索起点
    fn replace(&mut self, range: Range<usize>, replacement: &str, entry: &GlossaryEntry) -> usize {
        let origin = self.tracker.original_offset(range.start);
        self.pre.push(TermRange::new(entry.clone(), origin..origin + range.len(), TermRangeKind::Normalized));

        let rep = replace_with_particle_fix(self.fixer, &self.out, range.clone(), replacement, None);
        if rep.text != self.out {
            self.changed = true;
        }
        let delta = rep.delta.delta;
        if delta != 0 {
            for r in self.ranges.iter_mut().filter(|r| r.range.start >= range.end) {
                r.range = shift(&r.range, delta);
            }
            for p in self.protected.iter_mut().filter(|p| p.start >= range.end) {
                *p = shift(p, delta);
            }
            self.tracker.record_current(range.start, delta);
        }

        self.out = rep.text;
        self.protected.push(rep.range.clone());
        self.ranges.push(TermRange::new(entry.clone(), rep.range, TermRangeKind::Normalized));
        rep.next
    }
}

fn shift(r: &Range<usize>, delta: isize) -> Range<usize> {
    let start = (r.start as isize + delta).max(0) as usize;
    let end = (r.end as isize + delta).max(0) as usize;
    start..end
}

/// 译名规范化引擎
#[derive(Debug, Clone)]
pub struct NormalizationEngine {
    fixer: Arc<dyn GrammarFixer>,
    min_variant_chars: usize,
    nfkc: bool,
}

impl Default for NormalizationEngine {
    fn default() -> Self {
        Self::new(&NormalizationSettings::default())
    }
}

impl NormalizationEngine {
    pub fn new(settings: &NormalizationSettings) -> Self {
        Self { fixer: Arc::new(KoreanParticleFixer), min_variant_chars: settings.min_variant_chars, nfkc: settings.nfkc }
    }

    pub fn with_fixer(mut self, fixer: Arc<dyn GrammarFixer>) -> Self {
        self.fixer = fixer;
        self
    }

    pub fn min_variant_chars(&self) -> usize {
        self.min_variant_chars
    }

    /// 规范化译文，无额外保护区间
    pub fn normalize_with_order(
        &self,
        text: &str,
        pieces: &SegmentPieces,
        name_glossaries: &[NameGlossary],
    ) -> NormalizedText {
        self.normalize_with_order_protected(text, pieces, name_glossaries, &[])
    }

    /// 规范化译文，`protected`（通常是还原出来的目标词区间）内不做任何改写
    pub fn normalize_with_order_protected(
        &self,
        text: &str,
        pieces: &SegmentPieces,
        name_glossaries: &[NameGlossary],
        protected: &[Range<usize>],
    ) -> NormalizedText {
        let base = if self.nfkc { nfkc(text) } else { text.to_string() };
        if base.is_empty() || name_glossaries.is_empty() {
            return NormalizedText { text: base.clone(), pre_normalized_text: base, ..Default::default() };
        }

        let mut name_by_target: HashMap<&str, &NameGlossary> = HashMap::new();
        for g in name_glossaries {
            name_by_target.entry(g.target.as_str()).or_insert(g);
        }
        let mut entry_by_target: HashMap<&str, &GlossaryEntry> = HashMap::new();
        for e in pieces.unmasked_terms() {
            entry_by_target.entry(e.target.as_str()).or_insert(e);
        }
        let unmasked: Vec<(usize, &GlossaryEntry)> = pieces
            .pieces
            .iter()
            .enumerate()
            .filter_map(|(idx, p)| match p {
                Piece::Term { entry, .. } if !entry.pre_mask => Some((idx, entry)),
                _ => None,
            })
            .collect();

        let mut rw = Rewrite {
            fixer: self.fixer.as_ref(),
            out: base.clone(),
            ranges: Vec::new(),
            pre: Vec::new(),
            protected: protected.iter().filter(|r| base.get((*r).clone()).is_some()).cloned().collect(),
            tracker: DeltaTracker::new(),
            matched: BTreeMap::new(),
            changed: false,
        };
        let mut processed: HashSet<usize> = HashSet::new();

        // 1. 顺序匹配
        let mut last: Option<usize> = None;
        for (idx, entry) in &unmasked {
            let Some(name) = name_by_target.get(entry.target.as_str()) else {
                continue;
            };
            let candidates = make_candidates(&name.target, &name.variants);
            let Some((candidate, range)) =
                find_next_candidate(&rw.out, &candidates, last.unwrap_or(0), |r| !rw.overlaps_protected(r))
            else {
                continue;
            };
            rw.record_variant(&entry.target, &candidate);
            last = Some(rw.replace(range, &name.target, entry));
            processed.insert(*idx);
        }

        // 2. 组成术语回退
        let mut fallback_last: Option<usize> = None;
        let pending: Vec<(usize, &GlossaryEntry)> =
            unmasked.iter().filter(|(idx, _)| !processed.contains(idx)).copied().collect();
        for (idx, entry) in pending {
            let Some(fallbacks) = name_by_target.get(entry.target.as_str()).and_then(|n| n.fallback_terms.as_ref())
            else {
                continue;
            };
            for fallback in fallbacks {
                let candidates = make_candidates(&fallback.target, &fallback.variants);
                let Some((candidate, range)) = find_next_candidate(
                    &rw.out,
                    &candidates,
                    fallback_last.unwrap_or(0),
                    |r| !rw.overlaps_protected(r),
                ) else {
                    continue;
                };
                rw.record_variant(&entry.target, &candidate);
                fallback_last = Some(rw.replace(range, &fallback.target, entry));
                processed.insert(idx);
                break;
            }
        }

        // 3. 其余译名全文替换
        let remaining: HashSet<&str> = unmasked
            .iter()
            .filter(|(idx, _)| !processed.contains(idx))
            .map(|(_, e)| e.target.as_str())
            .collect();
        let mapped: Vec<(&NameGlossary, &GlossaryEntry)> = name_glossaries
            .iter()
            .filter(|g| remaining.contains(g.target.as_str()))
            .filter_map(|g| entry_by_target.get(g.target.as_str()).map(|e| (g, *e)))
            .collect();
        if !mapped.is_empty() {
            self.normalize_variants_and_particles(&mut rw, &mapped);
        }

        // 4. 扫尾
        let processed_targets: HashSet<String> = rw
            .ranges
            .iter()
            .map(|r| r.entry.target.clone())
            .chain(processed.iter().filter_map(|idx| pieces.pieces.get(*idx)?.entry().map(|e| e.target.clone())))
            .collect();
        let matched = rw.matched.clone();
        for (target, variants) in &matched {
            if !processed_targets.contains(target) {
                continue;
            }
            let (Some(name), Some(entry)) = (name_by_target.get(target.as_str()), entry_by_target.get(target.as_str()))
            else {
                continue;
            };
            self.sweep_variants(&mut rw, variants.iter(), &name.target, entry);

            for fallback in name.fallback_terms.iter().flatten() {
                let own: BTreeSet<&String> = std::iter::once(&fallback.target).chain(&fallback.variants).collect();
                let hits: Vec<&String> = variants.iter().filter(|v| own.contains(v)).collect();
                if !hits.is_empty() {
                    self.sweep_variants(&mut rw, hits.into_iter(), &fallback.target, entry);
                }
            }
        }

        if !rw.changed {
            return NormalizedText { text: base.clone(), pre_normalized_text: base, ..Default::default() };
        }

        rw.ranges.retain(|r| rw.out.get(r.range.clone()).is_some());
        rw.ranges.sort_by_key(|r| r.range.start);
        tracing::debug!("规范化完成: {} 处区间", rw.ranges.len());
        NormalizedText {
            text: rw.out,
            ranges: rw.ranges,
            pre_normalized_ranges: rw.pre,
            pre_normalized_text: base,
            deltas: rw.tracker.into_deltas(),
        }
    }

    /// 对一组译名做全文变体替换，命中必须位于词首
    fn normalize_variants_and_particles(&self, rw: &mut Rewrite<'_>, entries: &[(&NameGlossary, &GlossaryEntry)]) {
        let mut variant_map: HashMap<&str, (&str, &GlossaryEntry)> = HashMap::new();
        for &(glossary, entry) in entries {
            variant_map.entry(glossary.target.as_str()).or_insert((glossary.target.as_str(), entry));
            for v in by_length_desc(&glossary.variants) {
                variant_map.entry(v).or_insert((glossary.target.as_str(), entry));
            }
            for fallback in glossary.fallback_terms.iter().flatten() {
                variant_map.entry(fallback.target.as_str()).or_insert((fallback.target.as_str(), entry));
                for v in by_length_desc(&fallback.variants) {
                    variant_map.entry(v).or_insert((fallback.target.as_str(), entry));
                }
            }
        }
        if variant_map.is_empty() {
            return;
        }

        let mut alternatives: Vec<&str> = variant_map.keys().copied().collect();
        alternatives.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
        let pattern = alternatives.iter().map(|s| regex::escape(s)).collect::<Vec<_>>().join("|");
        let rx = match Regex::new(&pattern) {
            Ok(rx) => rx,
            Err(e) => {
                tracing::warn!("变体交替式构造失败: {}", e);
                return;
            }
        };

        let hits = word_start_matches(&rx, &rw.out);
        for r in hits.into_iter().rev() {
            if rw.overlaps_protected(&r) {
                continue;
            }
            let found = rw.out[r.clone()].to_string();
            let Some(&(canonical, entry)) = variant_map.get(found.as_str()) else {
                continue;
            };
            if found == canonical {
                continue;
            }
            rw.record_variant(&entry.target, &found);
            rw.replace(r, canonical, entry);
        }
    }

    /// 把已命中过的变体在全文剩余位置统一改写
    fn sweep_variants<'v>(
        &self,
        rw: &mut Rewrite<'_>,
        variants: impl Iterator<Item = &'v String>,
        replacement: &str,
        entry: &GlossaryEntry,
    ) {
        let mut sorted: Vec<&String> = variants.collect();
        sorted.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));

        for variant in sorted {
            if variant.chars().count() < self.min_variant_chars || variant == replacement {
                continue;
            }
            let hits: Vec<Range<usize>> = find_all_case_insensitive(&rw.out, variant)
                .into_iter()
                .filter(|r| !rw.overlaps_protected(r))
                .collect();
            for r in hits.into_iter().rev() {
                if rw.overlaps_protected(&r) {
                    continue;
                }
                rw.replace(r, replacement, entry);
            }
        }
    }
}

fn by_length_desc(variants: &[String]) -> Vec<&str> {
    let mut sorted: Vec<&str> = variants.iter().map(String::as_str).filter(|v| !v.is_empty()).collect();
    sorted.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
    sorted
}

/// 规范写法加变体，去空去重（含字母时按小写去重），长的在前
pub fn make_candidates(target: &str, variants: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<String> = Vec::new();
    for candidate in std::iter::once(target).chain(variants.iter().map(String::as_str)) {
        if candidate.is_empty() {
            continue;
        }
        let key = if candidate.chars().any(char::is_alphabetic) {
            candidate.to_lowercase()
        } else {
            candidate.to_string()
        };
        if seen.insert(key) {
            out.push(candidate.to_string());
        }
    }
    out.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
    out
}

/// 依候选顺序在 `from` 之后找第一个被接受的命中，都找不到再从头找
pub fn find_next_candidate(
    text: &str,
    candidates: &[String],
    from: usize,
    accept: impl Fn(&Range<usize>) -> bool,
) -> Option<(String, Range<usize>)> {
    let search = |start: usize| {
        candidates.iter().find_map(|c| {
            let mut pos = start;
            while let Some(r) = find_case_insensitive(text, c, pos) {
                if accept(&r) {
                    return Some((c.clone(), r));
                }
                pos = r.start + text[r.start..].chars().next().map_or(1, char::len_utf8);
            }
            None
        })
    };
    search(from).or_else(|| if from > 0 { search(0) } else { None })
}

/// 交替式的全部命中，要求命中前一个字符不是字母、数字或下划线
fn word_start_matches(rx: &Regex, text: &str) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos <= text.len() {
        let Some(m) = rx.find_at(text, pos) else {
            break;
        };
        if m.is_empty() {
            break;
        }
        let prev = text[..m.start()].chars().last();
        if prev.map_or(true, |c| !(c.is_alphanumeric() || c == '_')) {
            out.push(m.range());
            pos = m.end();
        } else {
            pos = m.start() + text[m.start()..].chars().next().map_or(1, char::len_utf8);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::masking::SegmentPiecesBuilder;
    use crate::translation::model::{EntryOrigin, Segment};
    use crate::translation::normalization::{make_name_glossaries_from_pieces, translate_ranges};
    use url::Url;

    fn entry(source: &str, target: &str, variants: &[&str], key: &str) -> GlossaryEntry {
        GlossaryEntry {
            source: source.to_string(),
            target: target.to_string(),
            variants: variants.iter().map(|v| v.to_string()).collect(),
            pre_mask: false,
            is_appellation: false,
            prohibit_standalone: false,
            origin: EntryOrigin::TermStandalone { term_key: key.to_string() },
            component_terms: Vec::new(),
            activator_keys: BTreeSet::new(),
            activates_keys: BTreeSet::new(),
            deactivated_in: Vec::new(),
        }
    }

    fn prepare(original: &str, entries: &[GlossaryEntry]) -> (SegmentPieces, Vec<NameGlossary>) {
        let seg = Segment::new("s", Url::parse("https://example.com/").unwrap(), 0, original);
        let (pieces, _) = SegmentPiecesBuilder::new().build(&seg, entries);
        let names = make_name_glossaries_from_pieces(&pieces, entries);
        (pieces, names)
    }

    #[test]
    fn test_variants_rewritten_with_particles() {
        let entries = vec![entry("凯文", "케빈", &["케이빈", "Kevin"], "kevin")];
        let (pieces, names) = prepare("凯文说话时，凯文也", &entries);

        let result = NormalizationEngine::default().normalize_with_order("케이빈이 말할 때, 케이빈도", &pieces, &names);
        assert_eq!(result.text, "케빈이 말할 때, 케빈도");
        assert_eq!(result.ranges.len(), 2);
        for r in &result.ranges {
            assert_eq!(r.slice(&result.text), Some("케빈"));
            assert_eq!(r.kind, TermRangeKind::Normalized);
        }
        assert_eq!(result.pre_normalized_ranges.len(), 2);
        assert_eq!(result.pre_normalized_ranges[1].slice(&result.pre_normalized_text), Some("케이빈"));
    }

    #[test]
    fn test_residual_variants_after_single_source() {
        let entries = vec![entry("凯文", "케빈", &["케이빈", "Kevin"], "kevin")];
        let (pieces, names) = prepare("凯文说话", &entries);

        let result = NormalizationEngine::default().normalize_with_order("케이빈이 말할 때, 케이빈도", &pieces, &names);
        assert_eq!(result.text, "케빈이 말할 때, 케빈도");
        assert_eq!(result.ranges.len(), 2);
        assert!(result.ranges.iter().all(|r| r.slice(&result.text) == Some("케빈")));
    }

    #[test]
    fn test_multiple_residual_instances() {
        let entries = vec![entry("凯文", "케빈", &["케이빈", "Kevin"], "kevin")];
        let (pieces, names) = prepare("凯文", &entries);

        let result = NormalizationEngine::default().normalize_with_order("케이빈과 케이빈과 케이빈", &pieces, &names);
        assert_eq!(result.text, "케빈과 케빈과 케빈");
        assert_eq!(result.ranges.len(), 3);
        assert_eq!(result.pre_normalized_ranges.len(), 3);
    }

    #[test]
    fn test_protected_ranges_not_swallowed() {
        let entries = vec![entry("凯", "가이", &["카이", "케이"], "kai"), entry("k", "케이", &[], "k")];
        let (pieces, names) = prepare("凯和k,凯", &entries);

        let result = NormalizationEngine::default().normalize_with_order("카이와 케이, 카이의 친구", &pieces, &names);
        assert_eq!(result.text, "가이와 케이, 가이의 친구");
        let tags: Vec<&str> = result.ranges.iter().map(|r| r.entry.target.as_str()).collect();
        assert_eq!(tags, vec!["가이", "케이", "가이"]);
        assert_eq!(result.ranges[1].slice(&result.text), Some("케이"));
    }

    #[test]
    fn test_canonical_text_is_untouched() {
        let entries = vec![entry("凯文", "케빈", &["케이빈", "Kevin"], "kevin")];
        let (pieces, names) = prepare("凯文说话", &entries);

        let input = "케빈이 말했다";
        let result = NormalizationEngine::default().normalize_with_order(input, &pieces, &names);
        assert_eq!(result.text, input);
        assert!(result.ranges.is_empty());
        assert!(result.deltas.is_empty());
    }

    #[test]
    fn test_case_insensitive_latin_variant() {
        let entries = vec![entry("凯文", "케빈", &["Kevin"], "kevin")];
        let (pieces, names) = prepare("凯文来了", &entries);
        let result = NormalizationEngine::default().normalize_with_order("KEVIN가 왔다", &pieces, &names);
        assert_eq!(result.text, "케빈이 왔다");
    }

    #[test]
    fn test_fallback_component_terms() {
        let kevin = entry("凯文", "케빈", &["케이빈"], "kevin");
        let mut title = entry("凯文老师", "케빈 선생님", &[], "");
        title.origin = EntryOrigin::Composer {
            composer_id: "name_title".to_string(),
            left_key: "kevin".to_string(),
            right_key: None,
            need_pair_check: false,
        };
        let all = vec![kevin, title];
        let (pieces, names) = prepare("凯文老师好", &all);

        let result = NormalizationEngine::default().normalize_with_order("케이빈 씨 안녕하세요", &pieces, &names);
        assert_eq!(result.text, "케빈 씨 안녕하세요");
        assert_eq!(result.ranges[0].entry.target, "케빈 선생님");
    }

    #[test]
    fn test_protected_input_ranges_and_delta_translation() {
        let entries = vec![entry("凯", "가이", &["카이"], "kai")];
        let (pieces, names) = prepare("凯", &entries);

        // 0..6 是还原出来的另一个目标词
        let text = "카이 카이";
        let result = NormalizationEngine::default().normalize_with_order_protected(text, &pieces, &names, &[0..6]);
        assert_eq!(result.text, "카이 가이");

        let masked = vec![TermRange::new(entry("x", "카이", &[], "x"), 0..6, TermRangeKind::Masked)];
        let moved = translate_ranges(&masked, &result.deltas, &result.text);
        assert_eq!(moved[0].slice(&result.text), Some("카이"));
    }

    #[test]
    fn test_short_variants_skipped_in_sweep() {
        let engine = NormalizationEngine::new(&NormalizationSettings { min_variant_chars: 3, ..Default::default() });
        assert_eq!(engine.min_variant_chars(), 3);
        let candidates = make_candidates("케빈", &["Kevin".to_string(), "kevin".to_string(), String::new()]);
        assert_eq!(candidates, vec!["Kevin".to_string(), "케빈".to_string()]);
    }

    #[test]
    fn test_word_start_guard() {
        let rx = Regex::new("케이").unwrap();
        assert_eq!(word_start_matches(&rx, "케이 말케이 (케이"), vec![0..6, 18..24]);
    }
}
