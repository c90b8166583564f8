//! 术语库快照 DTO 与展开后的匹配候选

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

// ============================================================================
// 外部术语库快照
// ============================================================================

/// 术语的一个原文写法
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSource {
    pub text: String,
    /// 单独出现时不遮蔽，需要激活者在场
    #[serde(default)]
    pub prohibit_standalone: bool,
}

impl TermSource {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), prohibit_standalone: false }
    }

    pub fn prohibited(text: impl Into<String>) -> Self {
        Self { text: text.into(), prohibit_standalone: true }
    }
}

/// 术语参与某个组合模式时的角色
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TermComponent {
    pub pattern: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub group_uids: Vec<String>,
    #[serde(default)]
    pub src_tpl_idx: Option<usize>,
    #[serde(default)]
    pub tgt_tpl_idx: Option<usize>,
}

/// 在页面文本中命中的术语
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchedTerm {
    pub key: String,
    pub target: String,
    #[serde(default)]
    pub variants: Vec<String>,
    pub sources: Vec<TermSource>,
    #[serde(default)]
    pub pre_mask: bool,
    #[serde(default)]
    pub is_appellation: bool,
    #[serde(default)]
    pub deactivated_in: Vec<String>,
    #[serde(default)]
    pub activator_keys: BTreeSet<String>,
    #[serde(default)]
    pub activates_keys: BTreeSet<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub components: Vec<TermComponent>,
}

/// 模式左右两侧的筛选条件
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoleSelector {
    /// 为空时匹配任意角色
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub tags_any: BTreeSet<String>,
    #[serde(default)]
    pub include_keys: BTreeSet<String>,
    #[serde(default)]
    pub exclude_keys: BTreeSet<String>,
}

impl RoleSelector {
    pub fn role(role: impl Into<String>) -> Self {
        Self { role: Some(role.into()), ..Default::default() }
    }

    /// 组件角色是否满足要求
    pub fn matches_role(&self, component_role: Option<&str>) -> bool {
        let required = match self.role.as_deref().map(str::trim) {
            Some(r) if !r.is_empty() => r,
            _ => return true,
        };
        match component_role.map(str::trim) {
            Some(role) if !role.is_empty() => role == required,
            _ => false,
        }
    }

    /// 术语本身是否通过标签/包含/排除过滤
    pub fn accepts_term(&self, term: &MatchedTerm) -> bool {
        if self.exclude_keys.contains(&term.key) {
            return false;
        }
        if !self.include_keys.is_empty() && !self.include_keys.contains(&term.key) {
            return false;
        }
        if !self.tags_any.is_empty() && self.tags_any.is_disjoint(&term.tags) {
            return false;
        }
        true
    }
}

/// 组合模式：把两个术语按模板拼接为复合条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub name: String,
    #[serde(default)]
    pub left: RoleSelector,
    #[serde(default)]
    pub right: Option<RoleSelector>,
    /// 含 `{L}` `{R}` `{J}` 槽位
    pub source_templates: Vec<String>,
    pub target_templates: Vec<String>,
    #[serde(default)]
    pub source_joiners: Vec<String>,
    #[serde(default)]
    pub skip_pairs_if_same_term: bool,
    #[serde(default)]
    pub pre_mask: bool,
    #[serde(default)]
    pub is_appellation: bool,
    #[serde(default)]
    pub need_pair_check: bool,
}

impl Pattern {
    /// 模板是否引用右侧术语
    pub fn uses_right(&self) -> bool {
        self.right.is_some()
            && (self.source_templates.iter().any(|t| t.contains("{R}"))
                || self.target_templates.iter().any(|t| t.contains("{R}")))
    }
}

/// 术语库针对一段全文的查询结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryData {
    pub matched_terms: Vec<MatchedTerm>,
    pub patterns: Vec<Pattern>,
    /// 术语 key → 实际出现在全文中的原文写法
    pub matched_sources_by_key: HashMap<String, BTreeSet<String>>,
}

impl GlossaryData {
    pub fn is_empty(&self) -> bool {
        self.matched_terms.is_empty()
    }
}

// ============================================================================
// 展开后的候选条目
// ============================================================================

/// 条目的来源
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EntryOrigin {
    TermStandalone {
        term_key: String,
    },
    Composer {
        composer_id: String,
        left_key: String,
        right_key: Option<String>,
        need_pair_check: bool,
    },
}

impl EntryOrigin {
    pub fn is_composite(&self) -> bool {
        matches!(self, EntryOrigin::Composer { .. })
    }

    /// 独立条目对应的术语 key
    pub fn standalone_key(&self) -> Option<&str> {
        match self {
            EntryOrigin::TermStandalone { term_key } => Some(term_key),
            EntryOrigin::Composer { .. } => None,
        }
    }
}

/// 生成条目的底层术语快照
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentTerm {
    pub key: String,
    pub target: String,
    pub variants: Vec<String>,
    pub source: String,
}

/// 展开后的不可变匹配候选
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlossaryEntry {
    pub source: String,
    pub target: String,
    pub variants: BTreeSet<String>,
    pub pre_mask: bool,
    pub is_appellation: bool,
    pub prohibit_standalone: bool,
    pub origin: EntryOrigin,
    pub component_terms: Vec<ComponentTerm>,
    pub activator_keys: BTreeSet<String>,
    pub activates_keys: BTreeSet<String>,
    pub deactivated_in: Vec<String>,
}

impl GlossaryEntry {
    /// 同一原文写法的优先级：独立条目优先，其次组件少者，最后按译文字典序
    pub fn priority_key(&self) -> (bool, usize, &str) {
        (self.origin.is_composite(), self.component_terms.len(), self.target.as_str())
    }

    /// 条目所属的全部术语 key
    pub fn term_keys(&self) -> impl Iterator<Item = &str> {
        self.component_terms.iter().map(|c| c.key.as_str())
    }
}
