//! 翻译选项与引擎标识

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::translation::error::TranslationError;

/// 译文风格
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TranslationStyle {
    #[default]
    NeutralDictionaryTone,
    Colloquial,
    Formal,
}

impl TranslationStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranslationStyle::NeutralDictionaryTone => "neutralDictionaryTone",
            TranslationStyle::Colloquial => "colloquial",
            TranslationStyle::Formal => "formal",
        }
    }
}

/// 源语言选择：自动检测（可带检测结果）或手动指定
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum SourceLanguage {
    Auto { detected: Option<String> },
    Manual { code: String },
}

impl SourceLanguage {
    pub fn auto() -> Self {
        SourceLanguage::Auto { detected: None }
    }

    pub fn manual(code: impl Into<String>) -> Self {
        SourceLanguage::Manual { code: code.into() }
    }

    /// 解析后的语言代码，未确定时为 `None`
    pub fn resolved(&self) -> Option<&str> {
        match self {
            SourceLanguage::Auto { detected } => detected.as_deref(),
            SourceLanguage::Manual { code } => Some(code),
        }
    }
}

impl Default for SourceLanguage {
    fn default() -> Self {
        Self::auto()
    }
}

/// 占位符两侧的空格策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSpacingBehavior {
    #[default]
    Disabled,
    IsolatedSegments,
}

impl FromStr for TokenSpacingBehavior {
    type Err = TranslationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "disabled" => Ok(TokenSpacingBehavior::Disabled),
            "isolated_segments" | "isolatedsegments" => Ok(TokenSpacingBehavior::IsolatedSegments),
            other => Err(TranslationError::ParseError(format!("未知的占位符空格策略: {}", other))),
        }
    }
}

/// 单次翻译请求的选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationOptions {
    pub preserve_formatting: bool,
    pub style: TranslationStyle,
    pub apply_glossary: bool,
    pub source_language: SourceLanguage,
    pub target_language: String,
    pub token_spacing: TokenSpacingBehavior,
    pub bypass_cache: bool,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        Self {
            preserve_formatting: true,
            style: TranslationStyle::default(),
            apply_glossary: true,
            source_language: SourceLanguage::default(),
            target_language: "ko".to_string(),
            token_spacing: TokenSpacingBehavior::default(),
            bypass_cache: false,
        }
    }
}

impl TranslationOptions {
    pub fn with_target(target_language: impl Into<String>) -> Self {
        Self { target_language: target_language.into(), ..Default::default() }
    }
}

/// 翻译引擎标识
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EngineTag {
    Afm,
    DeepL,
    Google,
    AfmMask,
    Unknown(String),
}

impl EngineTag {
    pub fn as_str(&self) -> &str {
        match self {
            EngineTag::Afm => "afm",
            EngineTag::DeepL => "deepl",
            EngineTag::Google => "google",
            EngineTag::AfmMask => "afmMask",
            EngineTag::Unknown(raw) => raw,
        }
    }

    /// 界面显示名
    pub fn display_name(&self) -> &str {
        match self {
            EngineTag::Afm => "AFM",
            EngineTag::DeepL => "DeepL",
            EngineTag::Google => "Google",
            EngineTag::AfmMask => "AFM Mask",
            EngineTag::Unknown(raw) => raw,
        }
    }
}

impl FromStr for EngineTag {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "afm" => EngineTag::Afm,
            "deepl" => EngineTag::DeepL,
            "google" => EngineTag::Google,
            "afmMask" => EngineTag::AfmMask,
            other => EngineTag::Unknown(other.to_string()),
        })
    }
}

impl fmt::Display for EngineTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EngineTag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EngineTag {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or(EngineTag::Unknown(raw)))
    }
}
