//! 译文修复：助词搭配、偏移量换算、译名表与规范化引擎

pub mod engine;
pub mod names;
pub mod particles;
pub mod ranges;

pub use engine::{NormalizationEngine, NormalizedText};
pub use names::make_name_glossaries_from_pieces;
pub use particles::{
    choose_josa, collapse_spaces_when_isolated, fix_particles, hangul_final_sound, replace_with_particle_fix,
    FinalSound, GrammarFixer, KoreanParticleFixer, Replacement,
};
pub use ranges::{
    apply_deltas_to_ranges, shift_offset, shift_ranges_from, translate_ranges, DeltaTracker, ReplacementDelta,
};
