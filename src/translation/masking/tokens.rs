//! 占位符的生成、扫描、修复与安全还原
//!
//! 占位符形如 `__E#12__`：ASCII 前缀加递增编号，两侧是固定的双下划线。
//! 机器翻译偶尔会破坏它（插入空格、换成全角数字、吞掉下划线），
//! [`normalize_damaged_tokens`] 负责按编号把它们认回来。

use std::collections::{BTreeMap, HashSet};
use std::ops::Range;

use regex::Regex;

use crate::translation::config::constants::{TOKEN_DELIMITER, TOKEN_ID_SEPARATOR};
use crate::translation::error::TranslationResult;
use crate::translation::model::LockInfo;
use crate::translation::text::halfwidth_digits;

/// 生成规范占位符
pub fn format_token(prefix: &str, index: usize) -> String {
    format!("{TOKEN_DELIMITER}{prefix}{TOKEN_ID_SEPARATOR}{index}{TOKEN_DELIMITER}")
}

/// 扫描所有形如 `__内容__` 的片段，内容非空且不含连续下划线
pub fn find_tokens(text: &str) -> Vec<Range<usize>> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] != b'_' || bytes[i + 1] != b'_' {
            i += 1;
            continue;
        }
        match scan_token_body(bytes, i + 2) {
            Some(end) => {
                out.push(i..end);
                i = end;
            }
            None => i += 1,
        }
    }
    out
}

/// 从内容起点向后找收尾的 `__`，返回整个占位符的结束位置
fn scan_token_body(bytes: &[u8], body_start: usize) -> Option<usize> {
    let mut j = body_start;
    while j < bytes.len() {
        if bytes[j] == b'_' && bytes.get(j + 1) == Some(&b'_') {
            return (j > body_start).then_some(j + 2);
        }
        j += 1;
    }
    None
}

/// 取占位符里的编号
pub fn token_number(token: &str) -> Option<usize> {
    let inner = token.trim_matches('_');
    let (_, digits) = inner.rsplit_once(TOKEN_ID_SEPARATOR)?;
    halfwidth_digits(digits).parse().ok()
}

/// 按编号排序的占位符列表，编号无法解析的按字典序排在后面
pub fn sorted_tokens<'a>(locks: &'a BTreeMap<String, LockInfo>) -> Vec<&'a str> {
    let mut tokens: Vec<&str> = locks.keys().map(String::as_str).collect();
    tokens.sort_by(|a, b| match (token_number(a), token_number(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.cmp(b),
    });
    tokens
}

/// 锁表里出现过的全部编号
pub fn lock_ids(locks: &BTreeMap<String, LockInfo>) -> HashSet<String> {
    locks.keys().filter_map(|k| token_number(k)).map(|n| n.to_string()).collect()
}

/// 把已知占位符换成目标词，未知的保持原样
pub fn unlock_terms_safely(text: &str, locks: &BTreeMap<String, LockInfo>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for r in find_tokens(text) {
        out.push_str(&text[last..r.start]);
        let whole = &text[r.clone()];
        out.push_str(locks.get(whole).map_or(whole, |lock| lock.target.as_str()));
        last = r.end;
    }
    out.push_str(&text[last..]);
    out
}

// ============================================================================
// 损坏占位符修复
// ============================================================================

/// 一轮修复：正则本体加上正则引擎不支持的前后断言
struct RepairPass {
    name: &'static str,
    regex: Regex,
    /// 命中前一个字符不能是下划线
    reject_underscore_before: bool,
    /// 命中后一个字符的禁止条件
    reject_after: fn(char) -> bool,
}

fn never(_: char) -> bool {
    false
}

fn is_underscore(c: char) -> bool {
    c == '_'
}

fn is_word_or_digit(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || matches!(c, '０'..='９')
}

fn repair_passes(prefix: &str) -> TranslationResult<Vec<RepairPass>> {
    let ws = r"(?:\s|\x{00A0}|\x{200B}|\x{200C}|\x{200D}|\x{FEFF})*";
    let d = "([0-9０-９]+)";
    let p = regex::escape(prefix);
    let sep = regex::escape(&TOKEN_ID_SEPARATOR.to_string());

    let pass = |name, pattern: String, before: bool, after: fn(char) -> bool| -> TranslationResult<RepairPass> {
        Ok(RepairPass { name, regex: Regex::new(&pattern)?, reject_underscore_before: before, reject_after: after })
    };

    Ok(vec![
        pass("spaced", format!("(?i)__{ws}{p}{ws}{sep}{ws}{d}{ws}__"), false, never)?,
        pass("bare_tail", format!("(?i){p}{sep}{d}_?__?"), true, is_underscore)?,
        pass("loose_both", format!("(?i)_?__?{p}{sep}{d}_?__?"), true, is_underscore)?,
        pass("open_only", format!("(?i)_?__?{p}{sep}{d}"), true, is_word_or_digit)?,
        pass("bare", format!("(?i){p}{sep}{d}"), true, is_word_or_digit)?,
    ])
}

/// 找出一轮里所有满足断言的命中，断言失败时从下一个字符继续
fn guarded_matches(pass: &RepairPass, text: &str) -> Vec<(Range<usize>, String)> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos <= text.len() {
        let Some(caps) = pass.regex.captures_at(text, pos) else {
            break;
        };
        let (Some(whole), Some(id)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let before_ok = !pass.reject_underscore_before || text[..whole.start()].chars().last() != Some('_');
        let after_ok = text[whole.end()..].chars().next().map_or(true, |c| !(pass.reject_after)(c));
        if before_ok && after_ok {
            out.push((whole.range(), id.as_str().to_string()));
            pos = whole.end().max(whole.start() + 1);
        } else {
            pos = whole.start() + text[whole.start()..].chars().next().map_or(1, char::len_utf8);
        }
        while pos < text.len() && !text.is_char_boundary(pos) {
            pos += 1;
        }
    }
    out
}

/// 依编号修复被翻译引擎破坏的占位符
///
/// 只在编号属于锁表时改写，其余片段逐字节保留。返回修复后的文本和改写次数。
pub fn normalize_damaged_tokens(
    text: &str,
    locks: &BTreeMap<String, LockInfo>,
    prefix: &str,
) -> TranslationResult<(String, usize)> {
    let valid = lock_ids(locks);
    if valid.is_empty() {
        return Ok((text.to_string(), 0));
    }

    let mut out = text.to_string();
    let mut repaired = 0;
    for pass in repair_passes(prefix)? {
        let matches = guarded_matches(&pass, &out);
        for (range, raw_id) in matches.into_iter().rev() {
            let id = halfwidth_digits(&raw_id);
            if !valid.contains(&id) {
                continue;
            }
            let Ok(n) = id.parse::<usize>() else {
                continue;
            };
            let canonical = format_token(prefix, n);
            if out[range.clone()] != canonical {
                tracing::debug!("修复占位符({}): {:?} -> {}", pass.name, &out[range.clone()], canonical);
                repaired += 1;
            }
            out.replace_range(range, &canonical);
        }
    }

    if repaired > 0 {
        metrics::counter!("glossa.masking.tokens_repaired").increment(repaired as u64);
    }
    Ok((out, repaired))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locks(ids: &[usize]) -> BTreeMap<String, LockInfo> {
        ids.iter()
            .map(|n| {
                let token = format_token("E", *n);
                let lock = LockInfo {
                    placeholder: token.clone(),
                    target: format!("T{n}"),
                    ends_with_batchim: false,
                    ends_with_rieul: false,
                    is_appellation: false,
                };
                (token, lock)
            })
            .collect()
    }

    #[test]
    fn test_find_tokens() {
        assert_eq!(find_tokens("a __E#1__ b"), vec![2..9]);
        assert_eq!(find_tokens("__E#1____E#2__"), vec![0..7, 7..14]);
        assert!(find_tokens("____").is_empty());
        assert!(find_tokens("snake_case_name").is_empty());
    }

    #[test]
    fn test_token_number_and_order() {
        assert_eq!(token_number("__E#12__"), Some(12));
        assert_eq!(token_number("__E#x__"), None);
        let l = locks(&[10, 2, 1]);
        assert_eq!(sorted_tokens(&l), vec!["__E#1__", "__E#2__", "__E#10__"]);
    }

    #[test]
    fn test_unlock_terms_safely_keeps_unknown() {
        let l = locks(&[1]);
        assert_eq!(unlock_terms_safely("__E#1__ and __E#9__", &l), "T1 and __E#9__");
    }

    #[test]
    fn test_repair_inserted_spaces() {
        let l = locks(&[1, 2]);
        let (out, n) = normalize_damaged_tokens("__ E # 1 __와 __E #2__", &l, "E").unwrap();
        assert_eq!(out, "__E#1__와 __E#2__");
        assert_eq!(n, 2);
    }

    #[test]
    fn test_repair_fullwidth_digits_and_case() {
        let l = locks(&[3]);
        let (out, _) = normalize_damaged_tokens("__e#３__는", &l, "E").unwrap();
        assert_eq!(out, "__E#3__는");
    }

    #[test]
    fn test_repair_missing_underscores() {
        let l = locks(&[1, 2]);
        let (out, _) = normalize_damaged_tokens("E#1__ 그리고 _E#2 끝", &l, "E").unwrap();
        assert_eq!(out, "__E#1__ 그리고 __E#2__ 끝");
    }

    #[test]
    fn test_unknown_ids_untouched() {
        let l = locks(&[1]);
        let input = "__ E # 7 __ E#8 __E#1__";
        let (out, n) = normalize_damaged_tokens(input, &l, "E").unwrap();
        assert_eq!(out, input);
        assert_eq!(n, 0);
    }
}
