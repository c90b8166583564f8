//! 遮蔽上下文
//!
//! 与引擎无关：同一页面状态可以先后交给多个引擎使用，而不必重新组合术语和遮蔽。

use std::collections::HashMap;

use rayon::prelude::*;

use crate::translation::config::OverlayConfig;
use crate::translation::glossary::{GlossaryComposer, GlossaryStore};
use crate::translation::masking::{MaskingEngine, SegmentPiecesBuilder};
use crate::translation::model::{
    GlossaryData, GlossaryEntry, MaskedPack, NameGlossary, Segment, SegmentPieces, TranslationOptions,
};
use crate::translation::normalization::make_name_glossaries_from_pieces;

/// 一次遮蔽的全部产物，按段落 ID 索引
#[derive(Debug, Clone, Default)]
pub struct MaskingContext {
    /// 发给引擎的段落（文本已遮蔽）
    pub masked_segments: Vec<Segment>,
    pub masked_packs: Vec<MaskedPack>,
    pub name_glossaries_per_segment: HashMap<String, Vec<NameGlossary>>,
    pub segment_pieces: HashMap<String, SegmentPieces>,
    pub glossary_entries: Vec<GlossaryEntry>,
}

impl MaskingContext {
    /// 不做任何遮蔽的上下文
    pub fn passthrough(segments: &[Segment]) -> Self {
        let mut ctx = Self::default();
        for seg in segments {
            let (pieces, pack) = passthrough_parts(seg);
            ctx.insert(seg, pieces, pack, Vec::new());
        }
        ctx
    }

    fn insert(&mut self, segment: &Segment, pieces: SegmentPieces, pack: MaskedPack, names: Vec<NameGlossary>) {
        self.masked_segments.push(segment.with_text(pack.masked.clone()));
        self.masked_packs.push(pack);
        self.name_glossaries_per_segment.insert(segment.id.clone(), names);
        self.segment_pieces.insert(segment.id.clone(), pieces);
    }

    pub fn pack(&self, segment_id: &str) -> Option<&MaskedPack> {
        self.masked_packs.iter().find(|p| p.segment.id == segment_id)
    }

    pub fn pieces(&self, segment_id: &str) -> Option<&SegmentPieces> {
        self.segment_pieces.get(segment_id)
    }

    pub fn name_glossaries(&self, segment_id: &str) -> &[NameGlossary] {
        self.name_glossaries_per_segment.get(segment_id).map_or(&[], Vec::as_slice)
    }

    pub fn contains(&self, segment_id: &str) -> bool {
        self.segment_pieces.contains_key(segment_id)
    }

    pub fn len(&self) -> usize {
        self.masked_packs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masked_packs.is_empty()
    }

    /// 取出某段的切片、遮蔽结果与译名表；上下文里没有时退化为原文直通
    pub fn parts_for(&self, segment: &Segment) -> (SegmentPieces, MaskedPack, Vec<NameGlossary>) {
        match (self.pieces(&segment.id), self.pack(&segment.id)) {
            (Some(pieces), Some(pack)) => {
                (pieces.clone(), pack.clone(), self.name_glossaries(&segment.id).to_vec())
            }
            _ => {
                let (pieces, pack) = passthrough_parts(segment);
                (pieces, pack, Vec::new())
            }
        }
    }
}

fn passthrough_parts(segment: &Segment) -> (SegmentPieces, MaskedPack) {
    let pieces = SegmentPieces::passthrough(segment.id.clone(), segment.original_text.clone());
    let pack = MaskedPack {
        segment: segment.clone(),
        masked: segment.original_text.clone(),
        masked_ranges: Vec::new(),
        locks: Default::default(),
        token_entries: Default::default(),
    };
    (pieces, pack)
}

/// 构建遮蔽上下文
///
/// 术语库查询失败时按空术语表继续，段落原样发送。
pub async fn prepare_masking_context(
    store: &dyn GlossaryStore,
    config: &OverlayConfig,
    segments: &[Segment],
    options: &TranslationOptions,
) -> MaskingContext {
    if !options.apply_glossary || segments.is_empty() {
        return MaskingContext::passthrough(segments);
    }

    let full_text = segments.iter().map(|s| s.original_text.as_str()).collect::<Vec<_>>().join("\n");
    let data = match store.fetch_data(&full_text).await {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!("术语库查询失败，按空术语表继续: {}", e);
            GlossaryData::default()
        }
    };

    let entries = GlossaryComposer::new().compose(&data, &full_text);
    build_context(config, segments, entries)
}

/// 在已有条目上为各段落切片、遮蔽并生成译名表
pub fn build_context(config: &OverlayConfig, segments: &[Segment], entries: Vec<GlossaryEntry>) -> MaskingContext {
    let builder = SegmentPiecesBuilder::with_policy(config.masking.standalone_policy);
    let engine = MaskingEngine::new(&config.masking);

    let mask_one = |segment: &Segment| {
        let (pieces, _) = builder.build(segment, &entries);
        let pack = engine.mask_from_pieces(&pieces, segment);
        let names = make_name_glossaries_from_pieces(&pieces, &entries);
        (pieces, pack, names)
    };

    let parts: Vec<(SegmentPieces, MaskedPack, Vec<NameGlossary>)> = if config.masking.parallel {
        segments.par_iter().map(mask_one).collect()
    } else {
        segments.iter().map(mask_one).collect()
    };

    let mut ctx = MaskingContext { glossary_entries: entries.clone(), ..Default::default() };
    for (segment, (pieces, pack, names)) in segments.iter().zip(parts) {
        ctx.insert(segment, pieces, pack, names);
    }
    tracing::debug!(
        "遮蔽上下文就绪: {} 段，{} 个候选条目，{} 个占位符",
        ctx.len(),
        ctx.glossary_entries.len(),
        ctx.masked_packs.iter().map(|p| p.locks.len()).sum::<usize>()
    );
    ctx
}
