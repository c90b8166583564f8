//! 韩语助词搭配修正
//!
//! 还原占位符或改写人名之后，紧跟其后的助词要按新词尾是否有收音（batchim）
//! 重新选择，例如 `사람는` -> `사람은`、`서울으로` -> `서울로`。
//! 修正逻辑挂在 [`GrammarFixer`] 接口后面，遮蔽/还原核心只依赖这个接口。

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

use super::ranges::ReplacementDelta;
use crate::translation::text::{is_loose_space, is_punct_or_space_only_loose, is_punct_or_symbol};

// ============================================================================
// 词尾发音
// ============================================================================

/// 目标词最后一个音节的收音信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FinalSound {
    pub has_batchim: bool,
    /// 收音为 ㄹ
    pub is_rieul: bool,
}

/// 取最后一个字符；不是韩文音节时视为无收音
pub fn hangul_final_sound(s: &str) -> FinalSound {
    let Some(last) = s.chars().last() else {
        return FinalSound::default();
    };
    let v = last as u32;
    if !(0xAC00..=0xD7A3).contains(&v) {
        return FinalSound::default();
    }
    match (v - 0xAC00) % 28 {
        0 => FinalSound::default(),
        jong => FinalSound { has_batchim: true, is_rieul: jong == 8 },
    }
}

// ============================================================================
// 修正接口
// ============================================================================

/// 替换后的语法修正器
pub trait GrammarFixer: Send + Sync + fmt::Debug {
    /// 判断替换词的词尾类别
    fn final_sound(&self, word: &str) -> FinalSound;

    /// 修正 `canonical` 区间之后紧跟的助词，只改助词本身
    fn fix_after(&self, text: &str, canonical: Range<usize>, sound: FinalSound) -> String;
}

/// 默认且唯一的实现
#[derive(Debug, Clone, Copy, Default)]
pub struct KoreanParticleFixer;

impl GrammarFixer for KoreanParticleFixer {
    fn final_sound(&self, word: &str) -> FinalSound {
        hangul_final_sound(word)
    }

    fn fix_after(&self, text: &str, canonical: Range<usize>, sound: FinalSound) -> String {
        fix_particles(text, canonical, sound)
    }
}

// ============================================================================
// 助词表
// ============================================================================

struct JosaPair {
    no_batchim: &'static str,
    with_batchim: &'static str,
    rieul_exception: bool,
    /// 后面粘着补助词时偏向有收音形式
    prefers_with_batchim_when_aux: bool,
}

const fn pair(no: &'static str, with: &'static str, rieul: bool, aux: bool) -> JosaPair {
    JosaPair { no_batchim: no, with_batchim: with, rieul_exception: rieul, prefers_with_batchim_when_aux: aux }
}

const JOSA_PAIRS: &[JosaPair] = &[
    pair("는", "은", false, true),
    pair("가", "이", false, true),
    pair("를", "을", false, true),
    pair("와", "과", false, false),
    pair("랑", "이랑", false, false),
    pair("로", "으로", true, true),
    pair("라", "이라", false, false),
    pair("였", "이었", false, false),
    pair("라고", "이라고", false, false),
    pair("라서", "이라서", false, false),
    pair("라면", "이라면", false, false),
    pair("라니", "이라니", false, false),
    pair("라도", "이라도", false, false),
    pair("의", "의", false, false),
];

const CASE_SINGLE: &[&str] = &[
    "에", "에서", "에게", "에게서", "와", "과", "랑", "하고", "께", "께서", "보다", "처럼", "같이", "로서", "으로서",
    "로써", "으로써", "의",
];

const AUXILIARY: &[&str] = &["만", "도", "까지", "부터", "조차", "마저", "밖에", "뿐", "나", "이나", "나마", "이나마"];

/// 助词写法 -> 所在对偶下标
static PAIR_FORMS: Lazy<HashMap<&'static str, usize>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for (idx, p) in JOSA_PAIRS.iter().enumerate() {
        map.insert(p.no_batchim, idx);
        map.insert(p.with_batchim, idx);
    }
    map
});

/// 所有助词的交替式，长的在前
static PARTICLE_ALTERNATION: Lazy<String> = Lazy::new(|| {
    let mut all: BTreeSet<&str> = BTreeSet::new();
    for p in JOSA_PAIRS {
        all.insert(p.no_batchim);
        all.insert(p.with_batchim);
    }
    all.extend(CASE_SINGLE.iter().copied());
    all.extend(AUXILIARY.iter().copied());
    let mut sorted: Vec<&str> = all.into_iter().collect();
    sorted.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
    sorted.iter().map(|s| regex::escape(s)).collect::<Vec<_>>().join("|")
});

static PARTICLE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("^(?:{})", PARTICLE_ALTERNATION.as_str())).expect("常量正则"));

static PARTICLE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:\s|\x{00A0})+").expect("常量正则"));

/// 词尾后的间隙（零宽字符、空白、至多一个右引号或右括号）加连续助词
static PARTICLE_AFTER_CANONICAL: Lazy<Regex> = Lazy::new(|| {
    let ws = r"(?:\s|\x{00A0}|\x{200B}|\x{200C}|\x{200D}|\x{FEFF})*";
    let soft_punct = r#"["'“”’»«》〈〉」』】）)\]}]"#;
    let gap = format!("(?:{ws}(?:{soft_punct})?{ws})");
    let alt = format!("(?:{})", PARTICLE_ALTERNATION.as_str());
    Regex::new(&format!("^({gap})({alt}{alt}*)")).expect("常量正则")
});

/// `이` 后面紧跟这些字符时说明它是词的一部分
static WORD_CONTINUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\p{Han}\p{Hiragana}\p{Katakana}A-Za-z0-9_\x{AC00}-\x{D7A3}]").expect("常量正则"));

#[derive(Debug, Clone, Copy)]
enum TokenKind {
    Pair(usize),
    Single,
    Auxiliary,
    Unknown,
}

// ============================================================================
// 助词选择
// ============================================================================

/// 按词尾发音为一串助词重新选择形式；没有需要改的就原样返回
pub fn choose_josa(candidate: &str, sound: FinalSound) -> String {
    if candidate.is_empty() {
        return String::new();
    }

    let mut segments: Vec<&str> = Vec::new();
    let mut whitespace: Vec<bool> = Vec::new();
    let mut pos = 0;
    while pos < candidate.len() {
        let rest = &candidate[pos..];
        if let Some(m) = PARTICLE_WHITESPACE.find(rest) {
            segments.push(m.as_str());
            whitespace.push(true);
            pos += m.end();
            continue;
        }
        if let Some(m) = PARTICLE_TOKEN.find(rest).filter(|m| !m.as_str().is_empty()) {
            segments.push(m.as_str());
            whitespace.push(false);
            pos += m.end();
            continue;
        }
        let step = rest.chars().next().map_or(rest.len(), char::len_utf8);
        segments.push(&rest[..step]);
        whitespace.push(false);
        pos += step;
    }

    let tokens: Vec<(usize, TokenKind)> = segments
        .iter()
        .enumerate()
        .filter(|(idx, _)| !whitespace[*idx])
        .map(|(idx, seg)| {
            let kind = if let Some(pair_idx) = PAIR_FORMS.get(*seg) {
                TokenKind::Pair(*pair_idx)
            } else if CASE_SINGLE.iter().any(|s| s == seg) {
                TokenKind::Single
            } else if AUXILIARY.iter().any(|s| s == seg) {
                TokenKind::Auxiliary
            } else {
                TokenKind::Unknown
            };
            (idx, kind)
        })
        .collect();

    if tokens.is_empty() {
        return candidate.to_string();
    }

    let no_whitespace_between = |a: usize, b: usize| {
        let (lo, hi) = (a.min(b), a.max(b));
        !(lo + 1..hi).any(|i| whitespace[i])
    };
    let aux_adjacent = |t: usize| {
        let seg = tokens[t].0;
        let left = t > 0
            && matches!(tokens[t - 1].1, TokenKind::Auxiliary)
            && no_whitespace_between(tokens[t - 1].0, seg);
        let right = t + 1 < tokens.len()
            && matches!(tokens[t + 1].1, TokenKind::Auxiliary)
            && no_whitespace_between(seg, tokens[t + 1].0);
        left || right
    };

    let mut result: Vec<&str> = segments.clone();
    let mut changed = false;
    for (t, (seg_idx, kind)) in tokens.iter().enumerate() {
        let TokenKind::Pair(pair_idx) = kind else {
            continue;
        };
        let p = &JOSA_PAIRS[*pair_idx];
        let use_with_batchim = if aux_adjacent(t) && p.prefers_with_batchim_when_aux {
            true
        } else if p.rieul_exception && sound.is_rieul {
            false
        } else {
            sound.has_batchim
        };
        let replacement = if use_with_batchim { p.with_batchim } else { p.no_batchim };
        if result[*seg_idx] != replacement {
            result[*seg_idx] = replacement;
            changed = true;
        }
    }

    if changed {
        result.concat()
    } else {
        candidate.to_string()
    }
}

/// 修正 `canonical` 之后的助词
///
/// 只替换助词所在的字节区间；`canonical` 本身不变，调用方据此得到规范词的位置。
pub fn fix_particles(text: &str, canonical: Range<usize>, sound: FinalSound) -> String {
    let end = canonical.end;
    if end >= text.len() || !text.is_char_boundary(end) {
        return text.to_string();
    }
    let tail = &text[end..];
    let Some(caps) = PARTICLE_AFTER_CANONICAL.captures(tail) else {
        return text.to_string();
    };
    let Some(josa) = caps.get(2).filter(|m| !m.as_str().is_empty()) else {
        return text.to_string();
    };

    let old = josa.as_str();
    if old == "이" && WORD_CONTINUATION.is_match(&tail[josa.end()..]) {
        return text.to_string();
    }

    let new = choose_josa(old, sound);
    if new == old {
        return text.to_string();
    }

    let start = end + josa.start();
    let stop = end + josa.end();
    let mut out = String::with_capacity(text.len() + new.len());
    out.push_str(&text[..start]);
    out.push_str(&new);
    out.push_str(&text[stop..]);
    out
}

// ============================================================================
// 替换 + 修正
// ============================================================================

/// 一次替换的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub text: String,
    /// 规范词在新文本中的区间
    pub range: Range<usize>,
    /// 下一次搜索的起点
    pub next: usize,
    /// 替换加助词修正造成的整体长度变化
    pub delta: ReplacementDelta,
}

/// 把 `range` 换成 `replacement`，再修正其后的助词
///
/// `sound` 为空时由修正器根据替换词自行判断。
pub fn replace_with_particle_fix(
    fixer: &dyn GrammarFixer,
    text: &str,
    range: Range<usize>,
    replacement: &str,
    sound: Option<FinalSound>,
) -> Replacement {
    let mut replaced = String::with_capacity(text.len() + replacement.len());
    replaced.push_str(&text[..range.start]);
    replaced.push_str(replacement);
    replaced.push_str(&text[range.end..]);

    let canonical = range.start..range.start + replacement.len();
    let sound = sound.unwrap_or_else(|| fixer.final_sound(replacement));
    let fixed = fixer.fix_after(&replaced, canonical.clone(), sound);

    Replacement {
        delta: ReplacementDelta::between(range.start, text.len(), fixed.len()),
        next: canonical.end,
        range: canonical,
        text: fixed,
    }
}

// ============================================================================
// 孤立片段的空格收拢
// ============================================================================

/// 段落除目标词外只剩标点和空白时，去掉目标词与标点（或文本边缘）之间的空白
///
/// 返回新文本和各处删除造成的增量，供调用方平移已记录的区间。
pub fn collapse_spaces_when_isolated(text: &str, target: &str) -> (String, Vec<ReplacementDelta>) {
    if target.is_empty() || !text.contains(target) {
        return (text.to_string(), Vec::new());
    }
    if !is_punct_or_space_only_loose(&text.replace(target, "")) {
        return (text.to_string(), Vec::new());
    }

    let mut removals: Vec<Range<usize>> = Vec::new();
    let mut floor = 0;
    let occurrences: Vec<usize> = text.match_indices(target).map(|(i, _)| i).collect();
    for (n, &start) in occurrences.iter().enumerate() {
        let end = start + target.len();

        let ws_start = text[floor..start]
            .char_indices()
            .rev()
            .take_while(|(_, c)| is_loose_space(*c))
            .last()
            .map_or(start, |(i, _)| floor + i);
        if ws_start < start {
            let before = text[..ws_start].chars().last();
            if before.map_or(true, is_punct_or_symbol) {
                removals.push(ws_start..start);
            }
        }

        let ceiling = occurrences.get(n + 1).copied().unwrap_or(text.len());
        let ws_len: usize =
            text[end..ceiling].chars().take_while(|c| is_loose_space(*c)).map(char::len_utf8).sum();
        if ws_len > 0 {
            let ws_end = end + ws_len;
            let after = text[ws_end..].chars().next();
            if after.map_or(true, is_punct_or_symbol) {
                removals.push(end..ws_end);
            }
        }
        floor = end;
    }

    if removals.is_empty() {
        return (text.to_string(), Vec::new());
    }
    removals.sort_by_key(|r| r.start);
    removals.dedup();

    let mut out = String::with_capacity(text.len());
    let mut deltas = Vec::with_capacity(removals.len());
    let mut cursor = 0;
    for r in removals {
        if r.start < cursor {
            continue;
        }
        out.push_str(&text[cursor..r.start]);
        deltas.push(ReplacementDelta::between(r.start, r.len(), 0));
        cursor = r.end;
    }
    out.push_str(&text[cursor..]);
    (out, deltas)
}
