//! # Glossa Overlay Library
//!
//! 网页内嵌翻译层的核心库：在机器翻译前用占位符遮蔽术语表中的专有名词，
//! 以流式方式接收翻译结果，再把正确的目标语言术语还原并规范化回译文，
//! 同时修正韩语助词的搭配。
//!
//! ## 模块组织
//!
//! - `env` - 类型安全的环境变量
//! - `translation` - 术语组合、遮蔽、规范化与流式路由（可选）

pub mod env;
#[cfg(feature = "translation")]
pub mod translation;
