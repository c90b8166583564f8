//! 遮蔽：段落切片、占位符、间隔策略与遮蔽引擎

pub mod engine;
pub mod pieces;
pub mod spacing;
pub mod tokens;

pub use engine::{MaskingEngine, UnmaskedText};
pub use pieces::{SegmentPiecesBuilder, StandalonePolicy};
pub use spacing::{insert_spaces_around_tokens_if_isolated, surround_token_with_nbsp};
pub use tokens::{find_tokens, format_token, normalize_damaged_tokens, unlock_terms_safely};
