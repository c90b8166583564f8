//! 翻译流水线的数据契约
//!
//! 条目与切分结果按请求创建、请求结束即丢弃；遮蔽结果只存活于一个段落的往返期间。

pub mod glossary;
pub mod masking;
pub mod options;
pub mod pieces;
pub mod segment;
pub mod stream;

pub use glossary::{
    ComponentTerm, EntryOrigin, GlossaryData, GlossaryEntry, MatchedTerm, Pattern, RoleSelector,
    TermComponent, TermSource,
};
pub use masking::{
    FallbackTerm, LockInfo, MaskedPack, NameGlossary, TermHighlightMetadata, TermRange, TermRangeKind,
};
pub use options::{EngineTag, SourceLanguage, TokenSpacingBehavior, TranslationOptions, TranslationStyle};
pub use pieces::{Piece, SegmentPieces};
pub use segment::{DomRange, Segment};
pub use stream::{
    EngineResult, SegmentTranslation, StreamEventKind, TranslationStreamError, TranslationStreamEvent,
    TranslationStreamPayload, TranslationStreamSummary,
};
