//! 术语渲染与召回用的小工具

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// 粗粒度文字类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
    Hangul,
    Cjk,
    Latin,
    Mixed,
    Unknown,
}

/// 单个字符的文字类别
pub fn script_kind_of(ch: char) -> ScriptKind {
    match ch as u32 {
        0xAC00..=0xD7A3 => ScriptKind::Hangul,
        0x4E00..=0x9FFF => ScriptKind::Cjk,
        0x0041..=0x007A | 0x0030..=0x0039 => ScriptKind::Latin,
        _ => ScriptKind::Unknown,
    }
}

/// 字符串的文字类别，出现多种文字时为 `Mixed`
pub fn detect_script_kind(s: &str) -> ScriptKind {
    let (mut hangul, mut cjk, mut latin) = (false, false, false);
    for ch in s.chars() {
        match script_kind_of(ch) {
            ScriptKind::Hangul => hangul = true,
            ScriptKind::Cjk => cjk = true,
            ScriptKind::Latin => latin = true,
            _ => {}
        }
    }
    match (hangul, cjk, latin) {
        (false, false, false) => ScriptKind::Unknown,
        (true, false, false) => ScriptKind::Hangul,
        (false, true, false) => ScriptKind::Cjk,
        (false, false, true) => ScriptKind::Latin,
        _ => ScriptKind::Mixed,
    }
}

/// 按字符数分桶
pub fn length_bucket(n: usize) -> u8 {
    match n {
        0..=2 => 2,
        3..=4 => 4,
        5..=8 => 8,
        9..=16 => 16,
        17..=24 => 24,
        _ => 32,
    }
}

/// 字符级 n-gram
pub fn qgrams(s: &str, n: usize) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    if n == 0 || chars.len() < n {
        return Vec::new();
    }
    chars.windows(n).map(|w| w.iter().collect()).collect()
}

/// 只保留在文本中出现的连接符，空连接符始终可用
pub fn filter_joiners(joiners: &[String], text: &str) -> Vec<String> {
    if joiners.is_empty() {
        return vec![String::new()];
    }
    if joiners.len() == 1 {
        return joiners.to_vec();
    }
    let mut result: Vec<String> = joiners.iter().filter(|j| !j.is_empty() && text.contains(j.as_str())).cloned().collect();
    if joiners.iter().any(String::is_empty) {
        result.push(String::new());
    }
    result
}

/// 一次源模板渲染的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSource {
    pub composed: String,
    pub left: String,
    pub right: Option<String>,
}

/// 展开 L/R 原文写法的笛卡尔积；未知槽位原样保留
pub fn render_sources(template: &str, joiner: &str, left: &[String], right: Option<&[String]>) -> Vec<RenderedSource> {
    let with_joiner = template.replace("{J}", joiner);
    let mut out = Vec::new();
    for l in left {
        let replaced_l = with_joiner.replace("{L}", l);
        match right {
            Some(rights) => {
                for r in rights {
                    out.push(RenderedSource {
                        composed: replaced_l.replace("{R}", r),
                        left: l.clone(),
                        right: Some(r.clone()),
                    });
                }
            }
            None => out.push(RenderedSource { composed: replaced_l, left: l.clone(), right: None }),
        }
    }
    out
}

/// 用规范译文渲染目标模板
pub fn render_target(template: &str, left: &str, right: Option<&str>) -> String {
    let rendered = template.replace("{L}", left);
    match right {
        Some(r) => rendered.replace("{R}", r),
        None => rendered,
    }
}

/// 生成复合条目的变体：左右各自的 (变体 + 译文) 组合，正反两个方向
pub fn render_variants(
    template: &str,
    joiners: &[String],
    left: (&str, &[String]),
    right: Option<(&str, &[String])>,
) -> BTreeSet<String> {
    let mut variants = BTreeSet::new();
    let (l_target, l_variants) = left;

    let Some((r_target, r_variants)) = right else {
        for v in l_variants {
            variants.insert(template.replace("{L}", v));
        }
        return variants;
    };

    let reverse = template.replace("{L}", "{T}").replace("{R}", "{L}").replace("{T}", "{R}");
    let l_all: Vec<&str> = l_variants.iter().map(String::as_str).chain(std::iter::once(l_target)).collect();
    let r_all: Vec<&str> = r_variants.iter().map(String::as_str).chain(std::iter::once(r_target)).collect();
    let joiners: Vec<&str> = if joiners.is_empty() { vec![""] } else { joiners.iter().map(String::as_str).collect() };

    for lv in &l_all {
        for rv in &r_all {
            for j in &joiners {
                for tpl in [template, reverse.as_str()] {
                    variants.insert(tpl.replace("{J}", j).replace("{L}", lv).replace("{R}", rv));
                }
            }
        }
    }
    variants
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_script_kind() {
        assert_eq!(detect_script_kind("사람"), ScriptKind::Hangul);
        assert_eq!(detect_script_kind("凯文"), ScriptKind::Cjk);
        assert_eq!(detect_script_kind("Kevin"), ScriptKind::Latin);
        assert_eq!(detect_script_kind("凯k"), ScriptKind::Mixed);
        assert_eq!(detect_script_kind("·!"), ScriptKind::Unknown);
    }

    #[test]
    fn test_qgrams_and_buckets() {
        assert_eq!(qgrams("凯文斯", 2), vec!["凯文".to_string(), "文斯".to_string()]);
        assert!(qgrams("凯", 2).is_empty());
        assert_eq!(length_bucket(1), 2);
        assert_eq!(length_bucket(7), 8);
        assert_eq!(length_bucket(40), 32);
    }

    #[test]
    fn test_filter_joiners_keeps_empty() {
        let joiners = vec!["·".to_string(), "-".to_string(), String::new()];
        assert_eq!(filter_joiners(&joiners, "凯文·史密斯"), vec!["·".to_string(), String::new()]);
        assert_eq!(filter_joiners(&[], "x"), vec![String::new()]);
    }

    #[test]
    fn test_render_variants_both_directions() {
        let l = vec!["카이".to_string()];
        let r = vec![];
        let out = render_variants("{L} {R}", &[], ("가이", &l), Some(("스미스", &r)));
        assert!(out.contains("카이 스미스"));
        assert!(out.contains("스미스 가이"));
        assert!(out.contains("가이 스미스"));
    }

    #[test]
    fn test_malformed_template_keeps_literal_slot() {
        let out = render_sources("{L}{X}", "", &["凯".to_string()], None);
        assert_eq!(out[0].composed, "凯{X}");
    }
}
