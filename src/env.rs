//! 类型化的环境变量
//!
//! 每个变量是一个实现了 [`EnvVar`] 的零大小类型，负责解析与校验。
//! 配置管理器只在变量被显式设置时用它覆盖文件配置。

use std::env;
use std::fmt;
use std::time::Duration;

/// 环境变量解析错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl EnvError {
    pub fn invalid(variable: &str, message: impl Into<String>) -> Self {
        Self { variable: variable.to_string(), message: message.into() }
    }
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 单个环境变量
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    /// 未设置时使用的值；`None` 表示必须设置
    fn fallback() -> Option<T> {
        None
    }

    fn get() -> EnvResult<T> {
        match Self::get_explicit() {
            Some(parsed) => parsed,
            None => Self::fallback()
                .ok_or_else(|| EnvError::invalid(Self::NAME, format!("not set, expected {}", Self::DESCRIPTION))),
        }
    }

    /// 仅当变量被显式设置时返回解析结果
    fn get_explicit() -> Option<EnvResult<T>> {
        env::var(Self::NAME).ok().map(|value| Self::parse(&value))
    }
}

/// 在固定候选中选择，支持别名；返回规范写法
fn parse_choice(name: &str, value: &str, choices: &[(&[&str], &'static str)]) -> EnvResult<String> {
    let normalized = value.trim().to_lowercase().replace('-', "_");
    choices
        .iter()
        .find(|(aliases, _)| aliases.contains(&normalized.as_str()))
        .map(|(_, canonical)| canonical.to_string())
        .ok_or_else(|| {
            let allowed: Vec<&str> = choices.iter().map(|(_, c)| *c).collect();
            EnvError::invalid(name, format!("'{}' is not one of {}", value, allowed.join(", ")))
        })
}

fn parse_bool(name: &str, value: &str) -> EnvResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Ok(true),
        "0" | "false" | "no" | "off" | "disabled" => Ok(false),
        _ => Err(EnvError::invalid(name, format!("'{}' is not a boolean", value))),
    }
}

fn parse_bounded(name: &str, value: &str, min: u64, max: u64) -> EnvResult<u64> {
    let n: u64 = value.trim().parse().map_err(|_| EnvError::invalid(name, format!("'{}' is not a number", value)))?;
    if !(min..=max).contains(&n) {
        return Err(EnvError::invalid(name, format!("{} is outside {}..={}", n, min, max)));
    }
    Ok(n)
}

// ============================================================================
// 运行环境
// ============================================================================

pub mod core {
    use super::*;

    /// 日志级别，`translation::init` 使用
    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "GLOSSA_LOG_LEVEL";
        const DESCRIPTION: &'static str = "trace, debug, info, warn or error";

        fn parse(value: &str) -> EnvResult<String> {
            parse_choice(
                Self::NAME,
                value,
                &[
                    (&["trace"], "trace"),
                    (&["debug"], "debug"),
                    (&["info"], "info"),
                    (&["warn", "warning"], "warn"),
                    (&["error"], "error"),
                ],
            )
        }

        fn fallback() -> Option<String> {
            Some("info".to_string())
        }
    }
}

// ============================================================================
// 遮蔽
// ============================================================================

pub mod masking {
    use super::*;

    /// 占位符前缀，`E` 生成 `__E#1__`
    pub struct TokenPrefix;
    impl EnvVar<String> for TokenPrefix {
        const NAME: &'static str = "GLOSSA_TOKEN_PREFIX";
        const DESCRIPTION: &'static str = "placeholder prefix, ASCII letters only";

        fn parse(value: &str) -> EnvResult<String> {
            let prefix = value.trim();
            if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(EnvError::invalid(Self::NAME, format!("'{}' must be ASCII letters", value)));
            }
            Ok(prefix.to_string())
        }

        fn fallback() -> Option<String> {
            Some("E".to_string())
        }
    }

    pub struct TokenSpacing;
    impl EnvVar<String> for TokenSpacing {
        const NAME: &'static str = "GLOSSA_TOKEN_SPACING";
        const DESCRIPTION: &'static str = "disabled or isolated_segments";

        fn parse(value: &str) -> EnvResult<String> {
            parse_choice(
                Self::NAME,
                value,
                &[(&["disabled", "off"], "disabled"), (&["isolated_segments", "isolated"], "isolated_segments")],
            )
        }

        fn fallback() -> Option<String> {
            Some("disabled".to_string())
        }
    }

    pub struct ParallelMasking;
    impl EnvVar<bool> for ParallelMasking {
        const NAME: &'static str = "GLOSSA_PARALLEL_MASKING";
        const DESCRIPTION: &'static str = "mask segments on the rayon pool";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(Self::NAME, value)
        }

        fn fallback() -> Option<bool> {
            Some(true)
        }
    }
}

// ============================================================================
// 规范化
// ============================================================================

pub mod normalization {
    use super::*;

    /// 比这更短的变体不参与替换
    pub struct MinVariantChars;
    impl EnvVar<usize> for MinVariantChars {
        const NAME: &'static str = "GLOSSA_MIN_VARIANT_CHARS";
        const DESCRIPTION: &'static str = "shortest variant rewritten by the sweep (1..=16)";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_bounded(Self::NAME, value, 1, 16).map(|n| n as usize)
        }

        fn fallback() -> Option<usize> {
            Some(2)
        }
    }
}

// ============================================================================
// 缓存
// ============================================================================

pub mod cache {
    use super::*;

    pub struct Enabled;
    impl EnvVar<bool> for Enabled {
        const NAME: &'static str = "GLOSSA_CACHE_ENABLED";
        const DESCRIPTION: &'static str = "cache segment translations";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(Self::NAME, value)
        }

        fn fallback() -> Option<bool> {
            Some(true)
        }
    }

    pub struct Capacity;
    impl EnvVar<usize> for Capacity {
        const NAME: &'static str = "GLOSSA_CACHE_CAPACITY";
        const DESCRIPTION: &'static str = "LRU capacity in segments (10..=1000000)";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_bounded(Self::NAME, value, 10, 1_000_000).map(|n| n as usize)
        }

        fn fallback() -> Option<usize> {
            Some(2000)
        }
    }

    /// 过期时间，秒
    pub struct Ttl;
    impl EnvVar<Duration> for Ttl {
        const NAME: &'static str = "GLOSSA_CACHE_TTL";
        const DESCRIPTION: &'static str = "entry lifetime in seconds (60..=2592000)";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_bounded(Self::NAME, value, 60, 30 * 86_400).map(Duration::from_secs)
        }

        fn fallback() -> Option<Duration> {
            Some(Duration::from_secs(86_400))
        }
    }
}

// ============================================================================
// 路由
// ============================================================================

pub mod router {
    use super::*;

    /// 首选引擎不可用时的默认引擎
    pub struct DefaultEngine;
    impl EnvVar<String> for DefaultEngine {
        const NAME: &'static str = "GLOSSA_DEFAULT_ENGINE";
        const DESCRIPTION: &'static str = "afm, afmMask, deepl or google";

        fn parse(value: &str) -> EnvResult<String> {
            match value.trim() {
                engine @ ("afm" | "afmMask" | "deepl" | "google") => Ok(engine.to_string()),
                _ => Err(EnvError::invalid(Self::NAME, format!("unknown engine '{}'", value))),
            }
        }

        fn fallback() -> Option<String> {
            Some("afm".to_string())
        }
    }

    pub struct YieldBetweenEvents;
    impl EnvVar<bool> for YieldBetweenEvents {
        const NAME: &'static str = "GLOSSA_YIELD_BETWEEN_EVENTS";
        const DESCRIPTION: &'static str = "yield to the scheduler after each stream event";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(Self::NAME, value)
        }

        fn fallback() -> Option<bool> {
            Some(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choice_aliases() {
        assert_eq!(core::LogLevel::parse("Warning").unwrap(), "warn");
        assert_eq!(core::LogLevel::parse(" DEBUG ").unwrap(), "debug");
        assert_eq!(masking::TokenSpacing::parse("isolated-segments").unwrap(), "isolated_segments");
        assert_eq!(masking::TokenSpacing::parse("OFF").unwrap(), "disabled");

        let err = core::LogLevel::parse("verbose").unwrap_err();
        assert_eq!(err.variable, "GLOSSA_LOG_LEVEL");
        assert!(err.message.contains("trace"));
    }

    #[test]
    fn test_boolean_parsing() {
        for yes in ["true", "1", "YES", " on "] {
            assert!(cache::Enabled::parse(yes).unwrap(), "{}", yes);
        }
        for no in ["false", "0", "No", "disabled"] {
            assert!(!cache::Enabled::parse(no).unwrap(), "{}", no);
        }
        assert!(cache::Enabled::parse("maybe").is_err());
    }

    #[test]
    fn test_token_prefix_validation() {
        assert_eq!(masking::TokenPrefix::parse(" E ").unwrap(), "E");
        assert_eq!(masking::TokenPrefix::parse("TERM").unwrap(), "TERM");
        for bad in ["", "E_", "E1", "#"] {
            assert!(masking::TokenPrefix::parse(bad).is_err(), "{:?}", bad);
        }
    }

    #[test]
    fn test_bounded_numbers() {
        assert_eq!(cache::Capacity::parse("500").unwrap(), 500);
        assert!(cache::Capacity::parse("5").is_err());
        assert!(cache::Capacity::parse("abc").is_err());

        assert!(cache::Ttl::parse("30").is_err());
        assert_eq!(cache::Ttl::parse("120").unwrap(), Duration::from_secs(120));

        assert!(normalization::MinVariantChars::parse("0").is_err());
        assert_eq!(normalization::MinVariantChars::parse("3").unwrap(), 3);

        assert_eq!(router::DefaultEngine::parse(" deepl ").unwrap(), "deepl");
        assert!(router::DefaultEngine::parse("babelfish").is_err());
    }
}
