//! 段落切片：按最长匹配把段落原文切成文本片段和术语片段

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::translation::glossary::TermActivationFilter;
use crate::translation::model::{GlossaryEntry, Piece, Segment, SegmentPieces};

/// 禁止单独出现的条目在被激活之后还需满足的邻接条件
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StandalonePolicy {
    /// 被在场术语激活即可
    #[default]
    ActivatedOnly,
    /// 还必须紧挨着另一个术语片段，否则降级为普通文本
    RequireTermNeighbor,
}

/// 段落切片器
#[derive(Debug, Clone, Default)]
pub struct SegmentPiecesBuilder {
    policy: StandalonePolicy,
}

impl SegmentPiecesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: StandalonePolicy) -> Self {
        Self { policy }
    }

    /// 本段可用的条目：原文出现、未被停用、禁止单独出现的需被激活
    pub fn eligible_entries(&self, segment_text: &str, entries: &[GlossaryEntry]) -> Vec<GlossaryEntry> {
        let present: Vec<&GlossaryEntry> = entries
            .iter()
            .filter(|e| !e.source.is_empty() && segment_text.contains(e.source.as_str()))
            .filter(|e| !TermActivationFilter::should_deactivate(&e.deactivated_in, segment_text))
            .collect();

        let present_keys: HashSet<&str> = present
            .iter()
            .filter(|e| !e.prohibit_standalone)
            .filter_map(|e| e.origin.standalone_key())
            .collect();

        present
            .into_iter()
            .filter(|e| !e.prohibit_standalone || TermActivationFilter::is_activated_by(e, &present_keys))
            .cloned()
            .collect()
    }

    /// 切分一个段落，同时返回本段可用的条目
    pub fn build(&self, segment: &Segment, entries: &[GlossaryEntry]) -> (SegmentPieces, Vec<GlossaryEntry>) {
        let text = segment.original_text.as_str();
        let eligible = self.eligible_entries(text, entries);
        if text.is_empty() || eligible.is_empty() {
            return (SegmentPieces::passthrough(segment.id.clone(), text), eligible);
        }

        // 同一原文只保留优先级最高的条目
        let mut by_source: BTreeMap<&str, &GlossaryEntry> = BTreeMap::new();
        for entry in &eligible {
            by_source
                .entry(entry.source.as_str())
                .and_modify(|cur| {
                    if entry.priority_key() < cur.priority_key() {
                        *cur = entry;
                    }
                })
                .or_insert(entry);
        }

        // 按首字符分桶，桶内长的在前
        let mut by_first: HashMap<char, Vec<&str>> = HashMap::new();
        for source in by_source.keys() {
            if let Some(c) = source.chars().next() {
                by_first.entry(c).or_default().push(source);
            }
        }
        for bucket in by_first.values_mut() {
            bucket.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        }

        let mut pieces: Vec<Piece> = Vec::new();
        let mut text_start = 0;
        let mut pos = 0;
        while pos < text.len() {
            let Some(c) = text[pos..].chars().next() else {
                break;
            };
            let hit = by_first
                .get(&c)
                .and_then(|bucket| bucket.iter().find(|s| text[pos..].starts_with(**s)))
                .copied();
            match hit {
                Some(source) => {
                    if text_start < pos {
                        pieces.push(Piece::Text { text: text[text_start..pos].to_string(), range: text_start..pos });
                    }
                    let entry = by_source[source].clone();
                    pieces.push(Piece::Term { entry, range: pos..pos + source.len() });
                    pos += source.len();
                    text_start = pos;
                }
                None => pos += c.len_utf8(),
            }
        }
        if text_start < text.len() {
            pieces.push(Piece::Text { text: text[text_start..].to_string(), range: text_start..text.len() });
        }

        if self.policy == StandalonePolicy::RequireTermNeighbor {
            pieces = demote_lonely_prohibited(pieces, text);
        }

        tracing::debug!(
            "段落 {} 切分为 {} 片，其中术语 {} 个",
            segment.id,
            pieces.len(),
            pieces.iter().filter(|p| p.is_term()).count()
        );

        (SegmentPieces { segment_id: segment.id.clone(), original_text: text.to_string(), pieces }, eligible)
    }
}

/// 两侧都没有术语片段的禁止单独条目降级为文本，并与相邻文本合并
fn demote_lonely_prohibited(pieces: Vec<Piece>, text: &str) -> Vec<Piece> {
    let lonely: Vec<bool> = (0..pieces.len())
        .map(|i| {
            let prohibited = pieces[i].entry().is_some_and(|e| e.prohibit_standalone);
            let left = i > 0 && pieces[i - 1].is_term();
            let right = pieces.get(i + 1).is_some_and(Piece::is_term);
            prohibited && !left && !right
        })
        .collect();

    let mut out: Vec<Piece> = Vec::with_capacity(pieces.len());
    for (piece, demote) in pieces.into_iter().zip(lonely) {
        let piece = if demote {
            let range = piece.range().clone();
            Piece::Text { text: text[range.clone()].to_string(), range }
        } else {
            piece
        };
        match (out.last_mut(), piece) {
            (Some(Piece::Text { text: prev, range: prev_range }), Piece::Text { text: cur, range }) => {
                prev.push_str(&cur);
                prev_range.end = range.end;
            }
            (_, piece) => out.push(piece),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::model::EntryOrigin;
    use std::collections::BTreeSet;
    use url::Url;

    fn entry(source: &str, target: &str, key: &str) -> GlossaryEntry {
        GlossaryEntry {
            source: source.to_string(),
            target: target.to_string(),
            variants: BTreeSet::new(),
            pre_mask: true,
            is_appellation: false,
            prohibit_standalone: false,
            origin: EntryOrigin::TermStandalone { term_key: key.to_string() },
            component_terms: Vec::new(),
            activator_keys: BTreeSet::new(),
            activates_keys: BTreeSet::new(),
            deactivated_in: Vec::new(),
        }
    }

    fn segment(text: &str) -> Segment {
        Segment::new("s1", Url::parse("https://example.com/").unwrap(), 0, text)
    }

    #[test]
    fn test_longest_match_wins() {
        let entries = vec![entry("Kevin", "케빈", "kevin"), entry("Kevin Smith", "케빈 스미스", "kevin_smith")];
        let (pieces, _) = SegmentPiecesBuilder::new().build(&segment("Kevin Smith arrived"), &entries);

        let term = pieces.pieces[0].entry().unwrap();
        assert_eq!(term.source, "Kevin Smith");
        assert_eq!(pieces.pieces[0].range(), &(0..11));
        assert!(pieces.covers_original());
        assert_eq!(pieces.reconstruct(), "Kevin Smith arrived");
    }

    #[test]
    fn test_coverage_with_multibyte_text() {
        let entries = vec![entry("凯", "가이", "kai"), entry("k", "케이", "k")];
        let (pieces, _) = SegmentPiecesBuilder::new().build(&segment("凯和k,凯"), &entries);
        assert!(pieces.covers_original());
        assert_eq!(pieces.detected_terms().len(), 3);
        assert_eq!(pieces.reconstruct(), "凯和k,凯");
    }

    #[test]
    fn test_deactivated_entry_skipped() {
        let mut e = entry("凯文", "케빈", "kevin");
        e.deactivated_in = vec!["外传".to_string()];
        let (pieces, eligible) = SegmentPiecesBuilder::new().build(&segment("凯文外传"), &[e]);
        assert!(eligible.is_empty());
        assert!(pieces.detected_terms().is_empty());
    }

    #[test]
    fn test_prohibited_needs_activator() {
        let mut title = entry("老师", "선생님", "laoshi");
        title.prohibit_standalone = true;
        title.activator_keys = ["kevin".to_string()].into_iter().collect();
        let kevin = entry("凯文", "케빈", "kevin");

        let builder = SegmentPiecesBuilder::new();
        let (alone, _) = builder.build(&segment("老师来了"), &[title.clone(), kevin.clone()]);
        assert!(alone.detected_terms().is_empty());

        let (with_name, _) = builder.build(&segment("凯文老师来了"), &[title, kevin]);
        assert_eq!(with_name.detected_terms().len(), 2);
    }

    #[test]
    fn test_require_neighbor_policy_demotes() {
        let mut title = entry("老师", "선생님", "laoshi");
        title.prohibit_standalone = true;
        title.activator_keys = ["kevin".to_string()].into_iter().collect();
        let kevin = entry("凯文", "케빈", "kevin");

        let builder = SegmentPiecesBuilder::with_policy(StandalonePolicy::RequireTermNeighbor);
        let (pieces, _) = builder.build(&segment("凯文说老师来了"), &[title, kevin]);
        assert_eq!(pieces.detected_terms().len(), 1);
        assert!(pieces.covers_original());
        assert_eq!(pieces.pieces.len(), 2, "降级后的文本应与相邻文本合并");
    }

    #[test]
    fn test_identical_sources_prefer_standalone() {
        let standalone = entry("凯文", "케빈", "kevin");
        let mut composite = entry("凯文", "가빈", "x");
        composite.origin = EntryOrigin::Composer {
            composer_id: "p".to_string(),
            left_key: "x".to_string(),
            right_key: None,
            need_pair_check: false,
        };
        let (pieces, _) = SegmentPiecesBuilder::new().build(&segment("凯文"), &[composite, standalone]);
        assert_eq!(pieces.pieces[0].entry().unwrap().target, "케빈");
    }
}
