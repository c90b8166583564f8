//! 占位符周围的间隔策略

use crate::translation::normalization::ReplacementDelta;
use crate::translation::text::{is_cjk, is_punct_or_space_only, is_punct_or_symbol, NBSP};

use super::tokens::find_tokens;

const BOUNDARY_PUNCT: &str = "。,!?;:()[]{}\"'、・·-—–“”‘’〈〉《》【】『』「」";

/// 文本边缘、空白、NBSP 或常见分隔标点
pub fn is_boundary(c: Option<char>) -> bool {
    match c {
        None => true,
        Some(c) => c == NBSP || c.is_whitespace() || BOUNDARY_PUNCT.contains(c),
    }
}

/// 占位符左右是否需要 NBSP：左侧紧贴汉字或韩文，右侧紧贴 ASCII 字母数字
pub fn nbsp_sides(before: Option<char>, after: Option<char>) -> (bool, bool) {
    let left = !is_boundary(before) && before.is_some_and(is_cjk);
    let right = !is_boundary(after) && after.is_some_and(|c| c.is_ascii_alphanumeric());
    (left, right)
}

/// 按需在 `token` 的每次出现两侧加 NBSP
pub fn surround_token_with_nbsp(text: &str, token: &str) -> String {
    if token.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + 4);
    let mut cursor = 0;
    for (start, _) in text.match_indices(token) {
        let end = start + token.len();
        let (left, right) = nbsp_sides(text[..start].chars().last(), text[end..].chars().next());
        out.push_str(&text[cursor..start]);
        if left {
            out.push(NBSP);
        }
        out.push_str(token);
        if right {
            out.push(NBSP);
        }
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// 段落去掉占位符后只剩标点和空白时，在占位符与相邻标点之间补一个空格
///
/// 段落以 `\n` 划分。返回新文本和每个插入点（插入前文本中的偏移，增量为 1）。
pub fn insert_spaces_around_tokens_if_isolated(text: &str) -> (String, Vec<ReplacementDelta>) {
    let mut inserts: Vec<usize> = Vec::new();
    let mut para_start = 0;

    for para in text.split('\n') {
        let tokens = find_tokens(para);
        if !tokens.is_empty() {
            let mut rest = String::with_capacity(para.len());
            let mut cursor = 0;
            for t in &tokens {
                rest.push_str(&para[cursor..t.start]);
                cursor = t.end;
            }
            rest.push_str(&para[cursor..]);

            if is_punct_or_space_only(&rest) {
                let lefts: Vec<usize> = tokens
                    .iter()
                    .filter(|t| para[..t.start].chars().last().is_some_and(is_punct_or_symbol))
                    .map(|t| t.start)
                    .collect();
                for t in &tokens {
                    if lefts.contains(&t.start) {
                        inserts.push(para_start + t.start);
                    }
                    let follows_punct = para[t.end..].chars().next().is_some_and(is_punct_or_symbol);
                    if follows_punct && !lefts.contains(&t.end) {
                        inserts.push(para_start + t.end);
                    }
                }
            }
        }
        para_start += para.len() + 1;
    }

    if inserts.is_empty() {
        return (text.to_string(), Vec::new());
    }
    inserts.sort_unstable();
    inserts.dedup();

    let mut out = String::with_capacity(text.len() + inserts.len());
    let mut cursor = 0;
    for &p in &inserts {
        out.push_str(&text[cursor..p]);
        out.push(' ');
        cursor = p;
    }
    out.push_str(&text[cursor..]);
    (out, inserts.into_iter().map(|p| ReplacementDelta::new(p, 1)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nbsp_sides() {
        assert_eq!(nbsp_sides(Some('凯'), Some('a')), (true, true));
        assert_eq!(nbsp_sides(Some('케'), Some('，')), (true, false));
        assert_eq!(nbsp_sides(Some(' '), Some('的')), (false, false));
        assert_eq!(nbsp_sides(None, None), (false, false));
        assert_eq!(nbsp_sides(Some('a'), Some('_')), (false, false));
    }

    #[test]
    fn test_surround_token_with_nbsp() {
        let out = surround_token_with_nbsp("王__E#1__abc", "__E#1__");
        assert_eq!(out, "王\u{00A0}__E#1__\u{00A0}abc");

        let out = surround_token_with_nbsp("(__E#1__)", "__E#1__");
        assert_eq!(out, "(__E#1__)");
    }

    #[test]
    fn test_isolated_segment_spacing() {
        let (out, deltas) = insert_spaces_around_tokens_if_isolated("「__E#1__」");
        assert_eq!(out, "「 __E#1__ 」");
        assert_eq!(deltas.len(), 2);

        let (out, deltas) = insert_spaces_around_tokens_if_isolated("他说「__E#1__」");
        assert_eq!(out, "他说「__E#1__」", "正常句子保持不变");
        assert!(deltas.is_empty());
    }

    #[test]
    fn test_isolated_spacing_per_paragraph() {
        let (out, _) = insert_spaces_around_tokens_if_isolated("正文__E#1__\n·__E#2__·");
        assert_eq!(out, "正文__E#1__\n· __E#2__ ·");
    }

    #[test]
    fn test_adjacent_tokens_get_one_space() {
        let (out, _) = insert_spaces_around_tokens_if_isolated("__E#1____E#2__");
        assert_eq!(out, "__E#1__ __E#2__");
    }
}
