//! 术语组合器
//!
//! 把术语库快照展开为扁平的匹配候选：独立条目在前（术语顺序、原文顺序），
//! 复合条目在后（模式顺序）。组合器是纯函数，不做任何关系遍历。

use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::util::{filter_joiners, render_sources, render_target, render_variants, RenderedSource};
use crate::translation::model::{
    ComponentTerm, EntryOrigin, GlossaryData, GlossaryEntry, MatchedTerm, Pattern, TermComponent,
};

/// 某个术语在某个模式中的一个组件
#[derive(Clone, Copy)]
struct Candidate<'a> {
    term: &'a MatchedTerm,
    component: &'a TermComponent,
}

/// 术语组合器
#[derive(Debug, Clone, Copy, Default)]
pub struct GlossaryComposer;

impl GlossaryComposer {
    pub fn new() -> Self {
        Self
    }

    /// 为一段文本（整页或单个段落）生成候选条目
    pub fn compose(&self, data: &GlossaryData, text: &str) -> Vec<GlossaryEntry> {
        let mut entries = standalone_entries(data, text);
        let standalone_sources: HashSet<String> = entries.iter().map(|e| e.source.clone()).collect();

        let composed = data
            .patterns
            .iter()
            .flat_map(|pattern| composed_entries(pattern, data, text))
            .filter(|e| !standalone_sources.contains(&e.source));
        entries.extend(composed);

        let entries = deduplicate(entries);
        tracing::debug!(
            "术语组合完成: {} 个候选（独立 {}）",
            entries.len(),
            standalone_sources.len()
        );
        entries
    }
}

fn standalone_entries(data: &GlossaryData, text: &str) -> Vec<GlossaryEntry> {
    let mut entries = Vec::new();

    for term in &data.matched_terms {
        let Some(matched) = data.matched_sources_by_key.get(&term.key) else {
            continue;
        };

        for source in &term.sources {
            if source.text.is_empty() || !matched.contains(&source.text) || !text.contains(source.text.as_str()) {
                continue;
            }
            entries.push(GlossaryEntry {
                source: source.text.clone(),
                target: term.target.clone(),
                variants: term.variants.iter().cloned().collect(),
                pre_mask: term.pre_mask,
                is_appellation: term.is_appellation,
                prohibit_standalone: source.prohibit_standalone,
                origin: EntryOrigin::TermStandalone { term_key: term.key.clone() },
                component_terms: vec![component_term(term, &source.text)],
                activator_keys: term.activator_keys.clone(),
                activates_keys: term.activates_keys.clone(),
                deactivated_in: term.deactivated_in.clone(),
            });
        }
    }

    entries
}

fn composed_entries(pattern: &Pattern, data: &GlossaryData, text: &str) -> Vec<GlossaryEntry> {
    let joiners = filter_joiners(&pattern.source_joiners, text);

    let entries: Vec<GlossaryEntry> = if pattern.uses_right() {
        matched_pairs(pattern, data)
            .into_iter()
            .flat_map(|(l, r)| pair_entries(pattern, &joiners, l, Some(r), data))
            .collect()
    } else {
        candidates(pattern, data, Side::Left)
            .into_iter()
            .flat_map(|l| pair_entries(pattern, &joiners, l, None, data))
            .collect()
    };

    entries
        .into_iter()
        .filter(|e| !e.source.is_empty() && text.contains(e.source.as_str()))
        .collect()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

fn candidates<'a>(pattern: &'a Pattern, data: &'a GlossaryData, side: Side) -> Vec<Candidate<'a>> {
    let selector = match side {
        Side::Left => &pattern.left,
        Side::Right => match &pattern.right {
            Some(right) => right,
            None => return Vec::new(),
        },
    };

    data.matched_terms
        .iter()
        .filter(|term| data.matched_sources_by_key.contains_key(&term.key) && selector.accepts_term(term))
        .flat_map(move |term| {
            term.components
                .iter()
                .filter(move |c| c.pattern == pattern.name && selector.matches_role(c.role.as_deref()))
                .map(move |component| Candidate { term, component })
        })
        .collect()
}

/// 左右配对：任一组件带分组时只在共享分组内配对，否则取笛卡尔积
fn matched_pairs<'a>(pattern: &'a Pattern, data: &'a GlossaryData) -> Vec<(Candidate<'a>, Candidate<'a>)> {
    let lefts = candidates(pattern, data, Side::Left);
    let rights = candidates(pattern, data, Side::Right);
    let keep = |l: &Candidate<'_>, r: &Candidate<'_>| !pattern.skip_pairs_if_same_term || l.term.key != r.term.key;

    let has_any_group = lefts.iter().chain(rights.iter()).any(|c| !c.component.group_uids.is_empty());
    if !has_any_group {
        let mut pairs = Vec::new();
        for l in &lefts {
            for r in rights.iter().filter(|r| keep(l, r)) {
                pairs.push((*l, *r));
            }
        }
        return pairs;
    }

    let mut left_by_group: BTreeMap<&str, Vec<Candidate<'a>>> = BTreeMap::new();
    let mut right_by_group: BTreeMap<&str, Vec<Candidate<'a>>> = BTreeMap::new();
    for c in &lefts {
        for g in &c.component.group_uids {
            left_by_group.entry(g.as_str()).or_default().push(*c);
        }
    }
    for c in &rights {
        for g in &c.component.group_uids {
            right_by_group.entry(g.as_str()).or_default().push(*c);
        }
    }

    let mut pairs = Vec::new();
    for (group, ls) in &left_by_group {
        let Some(rs) = right_by_group.get(group) else {
            continue;
        };
        for l in ls {
            for r in rs.iter().filter(|r| keep(l, r)) {
                pairs.push((*l, *r));
            }
        }
    }
    pairs
}

fn pair_entries(
    pattern: &Pattern,
    joiners: &[String],
    left: Candidate<'_>,
    right: Option<Candidate<'_>>,
    data: &GlossaryData,
) -> Vec<GlossaryEntry> {
    let src_idx = left
        .component
        .src_tpl_idx
        .or_else(|| right.and_then(|r| r.component.src_tpl_idx))
        .unwrap_or(0);
    let tgt_idx = left
        .component
        .tgt_tpl_idx
        .or_else(|| right.and_then(|r| r.component.tgt_tpl_idx))
        .unwrap_or(0);
    let (src_default, tgt_default) = if right.is_some() { ("{L}{J}{R}", "{L} {R}") } else { ("{L}", "{L}") };
    let src_tpl = pick_template(&pattern.source_templates, src_idx, src_default);
    let tgt_tpl = pick_template(&pattern.target_templates, tgt_idx, tgt_default);

    let l_term = left.term;
    let r_term = right.map(|r| r.term);

    let target = render_target(tgt_tpl, &l_term.target, r_term.map(|r| r.target.as_str()));
    let mut variants = render_variants(
        tgt_tpl,
        joiners,
        (&l_term.target, &l_term.variants),
        r_term.map(|r| (r.target.as_str(), r.variants.as_slice())),
    );
    variants.remove(&target);

    let mut activates_keys = l_term.activates_keys.clone();
    let mut deactivated_in = l_term.deactivated_in.clone();
    if let Some(r) = r_term {
        activates_keys.extend(r.activates_keys.iter().cloned());
        deactivated_in.extend(r.deactivated_in.iter().filter(|c| !l_term.deactivated_in.contains(c)).cloned());
    }

    let origin = EntryOrigin::Composer {
        composer_id: pattern.name.clone(),
        left_key: l_term.key.clone(),
        right_key: r_term.map(|r| r.key.clone()),
        need_pair_check: r_term.is_some() && pattern.need_pair_check,
    };

    let l_sources = appeared_sources(l_term, data);
    let r_sources = r_term.map(|r| appeared_sources(r, data));

    let mut entries = Vec::new();
    for joiner in joiners {
        for RenderedSource { composed, left: l_src, right: r_src } in
            render_sources(src_tpl, joiner, &l_sources, r_sources.as_deref())
        {
            let mut component_terms = vec![component_term(l_term, &l_src)];
            if let (Some(r), Some(r_src)) = (r_term, r_src.as_deref()) {
                component_terms.push(component_term(r, r_src));
            }
            entries.push(GlossaryEntry {
                source: composed,
                target: target.clone(),
                variants: variants.clone(),
                pre_mask: pattern.pre_mask,
                is_appellation: pattern.is_appellation,
                prohibit_standalone: false,
                origin: origin.clone(),
                component_terms,
                activator_keys: BTreeSet::new(),
                activates_keys: activates_keys.clone(),
                deactivated_in: deactivated_in.clone(),
            });
        }
    }
    entries
}

fn pick_template<'a>(templates: &'a [String], idx: usize, default: &'a str) -> &'a str {
    templates.get(idx).or_else(|| templates.first()).map(String::as_str).unwrap_or(default)
}

/// 术语在全文中实际出现过的原文写法，保持术语自身的顺序
fn appeared_sources(term: &MatchedTerm, data: &GlossaryData) -> Vec<String> {
    let matched = data.matched_sources_by_key.get(&term.key);
    let appeared: Vec<String> = term
        .sources
        .iter()
        .filter(|s| matched.map_or(false, |m| m.contains(&s.text)))
        .map(|s| s.text.clone())
        .collect();
    if appeared.is_empty() {
        term.sources.iter().map(|s| s.text.clone()).collect()
    } else {
        appeared
    }
}

fn component_term(term: &MatchedTerm, source: &str) -> ComponentTerm {
    ComponentTerm {
        key: term.key.clone(),
        target: term.target.clone(),
        variants: term.variants.clone(),
        source: source.to_string(),
    }
}

/// 去掉完全相同（原文、译文、来源都相同）的条目，保留首个
fn deduplicate(entries: Vec<GlossaryEntry>) -> Vec<GlossaryEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| seen.insert((e.source.clone(), e.target.clone(), e.origin.clone())))
        .collect()
}
