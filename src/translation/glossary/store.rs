//! 术语库读取接口与内存实现
//!
//! 召回分两步：先用 q-gram 索引缩小候选术语，再做字面子串检查。

use std::collections::{BTreeSet, HashMap, HashSet};

use futures::future::BoxFuture;
use futures::FutureExt;

use super::util::{detect_script_kind, length_bucket, qgrams, script_kind_of, ScriptKind};
use crate::translation::error::TranslationResult;
use crate::translation::model::{GlossaryData, MatchedTerm, Pattern};

/// 术语库只读查询
pub trait GlossaryStore: Send + Sync {
    /// 针对整页文本返回命中的术语、全部模式以及实际出现的原文写法
    fn fetch_data<'a>(&'a self, full_text: &'a str) -> BoxFuture<'a, TranslationResult<GlossaryData>>;
}

/// 召回参数
#[derive(Debug, Clone)]
pub struct RecallOptions {
    pub gram: usize,
    pub min_hit_per_term: usize,
    pub allowed_scripts: Option<HashSet<ScriptKind>>,
    pub allowed_len_buckets: Option<HashSet<u8>>,
    /// 单字也参与召回（仅限汉字）
    pub enable_unigram_recall: bool,
    pub max_distinct_unigrams: usize,
}

impl Default for RecallOptions {
    fn default() -> Self {
        Self {
            gram: 2,
            min_hit_per_term: 1,
            allowed_scripts: None,
            allowed_len_buckets: None,
            enable_unigram_recall: true,
            max_distinct_unigrams: 512,
        }
    }
}

#[derive(Debug, Clone)]
struct IndexRow {
    term_idx: usize,
    script: ScriptKind,
    len_bucket: u8,
}

/// 内存术语库
#[derive(Debug, Clone, Default)]
pub struct InMemoryGlossaryStore {
    terms: Vec<MatchedTerm>,
    patterns: Vec<Pattern>,
    index: HashMap<String, Vec<IndexRow>>,
    one_char_terms: BTreeSet<usize>,
    recall: RecallOptions,
}

impl InMemoryGlossaryStore {
    pub fn new(terms: Vec<MatchedTerm>, patterns: Vec<Pattern>) -> Self {
        Self::with_recall(terms, patterns, RecallOptions::default())
    }

    pub fn with_recall(terms: Vec<MatchedTerm>, patterns: Vec<Pattern>, recall: RecallOptions) -> Self {
        let mut store = Self { patterns, recall, ..Default::default() };
        for term in terms {
            store.insert_term(term);
        }
        store
    }

    /// 添加术语并更新索引
    pub fn insert_term(&mut self, term: MatchedTerm) {
        let term_idx = self.terms.len();
        for source in &term.sources {
            let count = source.text.chars().count();
            if count == 0 {
                continue;
            }
            if count == 1 {
                self.one_char_terms.insert(term_idx);
            }
            let script = detect_script_kind(&source.text);
            let len_bucket = length_bucket(count);
            for gram in qgrams(&source.text, count.clamp(1, 2)) {
                self.index.entry(gram).or_default().push(IndexRow { term_idx, script, len_bucket });
            }
        }
        self.terms.push(term);
    }

    pub fn add_pattern(&mut self, pattern: Pattern) {
        self.patterns.push(pattern);
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// q-gram 召回候选术语下标
    fn recall_term_indices(&self, text: &str) -> BTreeSet<usize> {
        let mut grams: HashSet<String> = qgrams(text, self.recall.gram).into_iter().collect();

        if self.recall.enable_unigram_recall {
            let mut freq: HashMap<char, usize> = HashMap::new();
            for ch in text.chars().filter(|c| script_kind_of(*c) == ScriptKind::Cjk) {
                *freq.entry(ch).or_insert(0) += 1;
            }
            let mut ranked: Vec<(char, usize)> = freq.into_iter().collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
            grams.extend(ranked.into_iter().take(self.recall.max_distinct_unigrams).map(|(c, _)| c.to_string()));
        }

        let mut hits: HashMap<usize, usize> = HashMap::new();
        for gram in &grams {
            let Some(rows) = self.index.get(gram) else {
                continue;
            };
            for row in rows {
                if let Some(scripts) = &self.recall.allowed_scripts {
                    if !scripts.contains(&row.script) {
                        continue;
                    }
                }
                if let Some(buckets) = &self.recall.allowed_len_buckets {
                    if !buckets.contains(&row.len_bucket) {
                        continue;
                    }
                }
                *hits.entry(row.term_idx).or_insert(0) += 1;
            }
        }

        let min_hit = self.recall.min_hit_per_term.max(1);
        let mut recalled: BTreeSet<usize> =
            hits.into_iter().filter(|(_, n)| *n >= min_hit).map(|(idx, _)| idx).collect();
        recalled.extend(self.one_char_terms.iter().copied());
        recalled
    }

    /// 同步查询，供异步接口和测试共用
    pub fn query(&self, full_text: &str) -> GlossaryData {
        let candidates = self.recall_term_indices(full_text);

        let mut matched_terms = Vec::new();
        let mut matched_sources_by_key: HashMap<String, BTreeSet<String>> = HashMap::new();
        for idx in candidates {
            let term = &self.terms[idx];
            let appeared: BTreeSet<String> = term
                .sources
                .iter()
                .filter(|s| !s.text.is_empty() && full_text.contains(s.text.as_str()))
                .map(|s| s.text.clone())
                .collect();
            if appeared.is_empty() {
                continue;
            }
            matched_sources_by_key.entry(term.key.clone()).or_default().extend(appeared);
            matched_terms.push(term.clone());
        }

        tracing::debug!("术语库召回: {} / {} 个术语命中", matched_terms.len(), self.terms.len());

        GlossaryData { matched_terms, patterns: self.patterns.clone(), matched_sources_by_key }
    }
}

impl GlossaryStore for InMemoryGlossaryStore {
    fn fetch_data<'a>(&'a self, full_text: &'a str) -> BoxFuture<'a, TranslationResult<GlossaryData>> {
        async move { Ok(self.query(full_text)) }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::model::TermSource;

    fn term(key: &str, target: &str, sources: &[&str]) -> MatchedTerm {
        MatchedTerm {
            key: key.to_string(),
            target: target.to_string(),
            sources: sources.iter().map(|s| TermSource::new(*s)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_query_reports_appeared_sources_only() {
        let store = InMemoryGlossaryStore::new(
            vec![term("kevin", "케빈", &["凯文", "Kevin"]), term("smith", "스미스", &["史密斯"])],
            vec![],
        );
        let data = store.query("凯文说了话");

        assert_eq!(data.matched_terms.len(), 1);
        assert_eq!(data.matched_terms[0].key, "kevin");
        let sources = &data.matched_sources_by_key["kevin"];
        assert!(sources.contains("凯文"));
        assert!(!sources.contains("Kevin"));
    }

    #[test]
    fn test_one_char_sources_always_recalled() {
        let recall = RecallOptions { enable_unigram_recall: false, ..Default::default() };
        let store = InMemoryGlossaryStore::with_recall(vec![term("kai", "가이", &["凯"])], vec![], recall);
        let data = store.query("凯和k");
        assert_eq!(data.matched_terms.len(), 1);
    }

    #[test]
    fn test_script_filter_excludes_rows() {
        let recall = RecallOptions {
            allowed_scripts: Some([ScriptKind::Hangul].into_iter().collect()),
            ..Default::default()
        };
        let store = InMemoryGlossaryStore::with_recall(vec![term("kevin", "케빈", &["凯文"])], vec![], recall);
        assert!(store.query("凯文").matched_terms.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_data_is_async_view_of_query() {
        let store = InMemoryGlossaryStore::new(vec![term("kevin", "케빈", &["Kevin"])], vec![]);
        let data = store.fetch_data("Kevin Smith").await.unwrap();
        assert_eq!(data.matched_terms.len(), 1);
    }
}
