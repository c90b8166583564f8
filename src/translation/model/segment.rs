//! 页面段落

use serde::{Deserialize, Serialize};
use url::Url;

/// 段落在 DOM 中的锚点
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DomRange {
    pub start_token: String,
    pub start_offset: usize,
    pub end_token: String,
    pub end_offset: usize,
    pub start_index: usize,
    pub end_index: usize,
}

/// 从页面抽取出的一段可翻译文本
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub url: Url,
    pub index_in_page: usize,
    pub original_text: String,
    pub normalized_text: String,
    pub dom_range: Option<DomRange>,
}

impl Segment {
    pub fn new(id: impl Into<String>, url: Url, index_in_page: usize, original_text: impl Into<String>) -> Self {
        let original_text = original_text.into();
        Self {
            id: id.into(),
            url,
            index_in_page,
            normalized_text: original_text.clone(),
            original_text,
            dom_range: None,
        }
    }

    /// 以新的文本派生段落，用于把遮蔽后的文本交给引擎
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id: self.id.clone(),
            url: self.url.clone(),
            index_in_page: self.index_in_page,
            normalized_text: text.clone(),
            original_text: text,
            dom_range: self.dom_range.clone(),
        }
    }
}
