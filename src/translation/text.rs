//! 字符分类与文本小工具

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static PUNCT_OR_SYMBOL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\p{P}\p{S}]$").expect("常量正则"));

static PUNCT_OR_SPACE_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\p{P}\p{S}\s]*$").expect("常量正则"));

static PUNCT_OR_SPACE_ONLY_LOOSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\p{P}\p{S}\s\u{00A0}\u{202F}\u{2009}\u{200A}\u{200B}\u{205F}\u{3000}]*$").expect("常量正则")
});

pub const NBSP: char = '\u{00A0}';

/// 标点或符号
pub fn is_punct_or_symbol(c: char) -> bool {
    let mut buf = [0u8; 4];
    PUNCT_OR_SYMBOL.is_match(c.encode_utf8(&mut buf))
}

/// 只由标点、符号和空白组成（空串也算）
pub fn is_punct_or_space_only(s: &str) -> bool {
    PUNCT_OR_SPACE_ONLY.is_match(s)
}

/// 同上，额外接受 NBSP、窄空格、零宽空格和全角空格
pub fn is_punct_or_space_only_loose(s: &str) -> bool {
    PUNCT_OR_SPACE_ONLY_LOOSE.is_match(s)
}

/// 宽松空白：普通空白加上排版里常见的特殊空格
pub fn is_loose_space(c: char) -> bool {
    c.is_whitespace() || matches!(c, '\u{00A0}' | '\u{202F}' | '\u{2009}' | '\u{200A}' | '\u{200B}' | '\u{205F}' | '\u{3000}')
}

/// 汉字（含扩展 A 与兼容区）或韩文音节
pub fn is_cjk(c: char) -> bool {
    matches!(c as u32, 0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF | 0xAC00..=0xD7A3)
}

pub fn is_hangul_syllable(c: char) -> bool {
    matches!(c as u32, 0xAC00..=0xD7A3)
}

/// NFKC 兼容分解后再组合，全角数字与字母在这里变成半角
pub fn nfkc(s: &str) -> String {
    s.nfkc().collect()
}

/// 把全角数字换成半角，其余字符不变
pub fn halfwidth_digits(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '０'..='９' => char::from_u32(c as u32 - 0xFF10 + '0' as u32).unwrap_or(c),
            _ => c,
        })
        .collect()
}

/// 大小写不敏感的子串查找，返回 `text` 中的字节区间
///
/// 只在两边小写化后字节长度不变时才按字节对齐，否则退回逐字符比较。
pub fn find_case_insensitive(text: &str, needle: &str, from: usize) -> Option<std::ops::Range<usize>> {
    if needle.is_empty() || from > text.len() || !text.is_char_boundary(from) {
        return None;
    }
    let needle_lower: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
    let hay = &text[from..];
    for (start, _) in hay.char_indices() {
        let mut matched = 0;
        let mut end = start;
        for (off, ch) in hay[start..].char_indices() {
            let lower: Vec<char> = ch.to_lowercase().collect();
            if matched + lower.len() > needle_lower.len() || needle_lower[matched..matched + lower.len()] != lower[..] {
                break;
            }
            matched += lower.len();
            end = start + off + ch.len_utf8();
            if matched == needle_lower.len() {
                return Some(from + start..from + end);
            }
        }
    }
    None
}

/// 所有不重叠的大小写不敏感命中
pub fn find_all_case_insensitive(text: &str, needle: &str) -> Vec<std::ops::Range<usize>> {
    let mut out = Vec::new();
    let mut from = 0;
    while let Some(r) = find_case_insensitive(text, needle, from) {
        from = r.end;
        out.push(r);
    }
    out
}
