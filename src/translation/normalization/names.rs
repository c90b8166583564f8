//! 译名表：把段落里未遮蔽的术语整理成“规范译名 + 变体 + 预期次数”

use std::collections::{BTreeSet, HashMap};

use crate::translation::model::{EntryOrigin, FallbackTerm, GlossaryEntry, NameGlossary, Piece, SegmentPieces};

/// 按目标词聚合的中间结果，保持首次出现顺序
#[derive(Default)]
struct NameBucket {
    variants: Vec<String>,
    seen: BTreeSet<String>,
    expected: usize,
    fallbacks: Vec<FallbackTerm>,
}

impl NameBucket {
    fn absorb_variants<'a>(&mut self, variants: impl IntoIterator<Item = &'a String>) {
        for v in variants {
            if !v.is_empty() && self.seen.insert(v.clone()) {
                self.variants.push(v.clone());
            }
        }
    }
}

fn finish(buckets: HashMap<String, NameBucket>) -> Vec<NameGlossary> {
    let mut out: Vec<NameGlossary> = buckets
        .into_iter()
        .map(|(target, b)| NameGlossary {
            target,
            variants: b.variants,
            expected_count: b.expected,
            fallback_terms: (!b.fallbacks.is_empty()).then_some(b.fallbacks),
        })
        .collect();
    out.sort_by(|a, b| b.expected_count.cmp(&a.expected_count).then_with(|| a.target.cmp(&b.target)));
    out
}

/// 由切片结果生成译名表
///
/// 只看未遮蔽的术语片段。组合条目额外带上左右组成术语的独立条目作为回退。
pub fn make_name_glossaries_from_pieces(pieces: &SegmentPieces, all_entries: &[GlossaryEntry]) -> Vec<NameGlossary> {
    let unmasked = pieces.unmasked_terms();
    if unmasked.is_empty() {
        return Vec::new();
    }

    let mut buckets: HashMap<String, NameBucket> = HashMap::new();
    for entry in unmasked {
        if entry.target.is_empty() {
            continue;
        }
        let bucket = buckets.entry(entry.target.clone()).or_default();
        bucket.absorb_variants(&entry.variants);
        bucket.expected += pieces
            .pieces
            .iter()
            .filter(|p| matches!(p, Piece::Term { entry: e, .. } if e.target == entry.target))
            .count();

        if let EntryOrigin::Composer { left_key, right_key, .. } = &entry.origin {
            for key in std::iter::once(left_key).chain(right_key.as_ref()) {
                let standalone = all_entries.iter().find(|e| e.origin.standalone_key() == Some(key.as_str()));
                if let Some(fallback) = standalone {
                    bucket.fallbacks.push(FallbackTerm {
                        term_key: key.clone(),
                        target: fallback.target.clone(),
                        variants: fallback.variants.iter().cloned().collect(),
                    });
                }
            }
        }
    }

    finish(buckets)
}
