//! 条件激活与停用

use std::collections::HashSet;

use crate::translation::model::GlossaryEntry;

/// 段落级的激活判断，只看段落自身文本
pub struct TermActivationFilter;

impl TermActivationFilter {
    /// 任一停用上下文出现在段落中时停用
    pub fn should_deactivate(deactivated_in: &[String], segment_text: &str) -> bool {
        deactivated_in
            .iter()
            .any(|ctx| !ctx.is_empty() && segment_text.contains(ctx.as_str()))
    }

    /// 禁止单独出现的条目是否被在场术语激活
    pub fn is_activated_by(entry: &GlossaryEntry, present_keys: &HashSet<&str>) -> bool {
        entry.activator_keys.iter().any(|k| present_keys.contains(k.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_deactivate() {
        let contexts = vec!["外传".to_string(), String::new()];
        assert!(TermActivationFilter::should_deactivate(&contexts, "凯文外传第一章"));
        assert!(!TermActivationFilter::should_deactivate(&contexts, "凯文来了"));
        assert!(!TermActivationFilter::should_deactivate(&[], "anything"));
    }
}
