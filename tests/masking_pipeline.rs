//! 遮蔽与规范化集成测试
//!
//! 从术语快照出发，经过组合、切片、遮蔽、还原与规范化的完整往返

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use glossa_overlay::translation::config::OverlayConfig;
use glossa_overlay::translation::core::{build_context, TranslationEngine, TranslationRouter};
use glossa_overlay::translation::glossary::{GlossaryComposer, InMemoryGlossaryStore};
use glossa_overlay::translation::masking::SegmentPiecesBuilder;
use glossa_overlay::translation::model::{EngineTag, GlossaryData, MatchedTerm, Segment, TermRangeKind};

mod common {
    include!("common/mod.rs");
}

use common::{ScriptedEngine, TermBuilder, TestDataGenerator};

/// 直接构造快照：所有术语的原文写法都视为已命中
fn snapshot(terms: Vec<MatchedTerm>) -> GlossaryData {
    let matched_sources_by_key: HashMap<String, BTreeSet<String>> = terms
        .iter()
        .map(|t| (t.key.clone(), t.sources.iter().map(|s| s.text.clone()).collect()))
        .collect();
    GlossaryData { matched_terms: terms, patterns: Vec::new(), matched_sources_by_key }
}

fn router() -> TranslationRouter {
    let engine: Arc<dyn TranslationEngine> = Arc::new(ScriptedEngine::echo(EngineTag::Afm));
    TranslationRouter::new(
        vec![engine],
        Arc::new(InMemoryGlossaryStore::new(Vec::new(), Vec::new())),
        None,
        OverlayConfig::default(),
    )
}

/// 组合并遮蔽，然后把 `translated` 当作引擎输出还原
fn round_trip(terms: Vec<MatchedTerm>, original: &str, translated: impl Fn(&str) -> String) -> (String, Vec<(String, String)>) {
    let router = router();
    let entries = GlossaryComposer::new().compose(&snapshot(terms), original);
    let segment = TestDataGenerator::segment("s1", original);
    let ctx = build_context(router.config(), std::slice::from_ref(&segment), entries);
    let (pieces, pack, names) = ctx.parts_for(&segment);

    let output = translated(&pack.masked);
    let restored = router.restore_output(&pack, &pieces, &names, &output, &EngineTag::Afm);
    let tagged = restored
        .highlight_metadata
        .map(|m| m.final_term_ranges)
        .unwrap_or_default()
        .into_iter()
        .map(|r| (r.slice(&restored.text).unwrap_or_default().to_string(), r.entry.target.clone()))
        .collect();
    (restored.text, tagged)
}

/// 测试切片覆盖不变式
#[test]
fn test_pieces_cover_original_text() {
    let terms = vec![
        TermBuilder::new("kevin", "케빈").source("凯文").masked().build(),
        TermBuilder::new("kevin-full", "케빈 스미스").source("凯文·史密斯").masked().build(),
        TermBuilder::new("seoul", "서울").source("首尔").build(),
    ];
    let texts = ["凯文·史密斯在首尔", "凯文凯文", "没有任何术语", "", "首尔！凯文？"];

    for text in texts {
        let entries = GlossaryComposer::new().compose(&snapshot(terms.clone()), text);
        let (pieces, _) = SegmentPiecesBuilder::new().build(&TestDataGenerator::segment("s", text), &entries);
        assert_eq!(pieces.reconstruct(), text, "切片拼接应还原原文: {:?}", text);
        assert!(text.is_empty() || pieces.covers_original(), "切片之间不能有空隙或重叠: {:?}", text);
    }

    println!("✅ Coverage invariant test passed");
}

/// 测试最长匹配
#[test]
fn test_longest_match_wins() {
    let terms = vec![
        TermBuilder::new("kevin", "케빈").source("Kevin").masked().build(),
        TermBuilder::new("kevin-smith", "케빈 스미스").source("Kevin Smith").masked().build(),
    ];
    let original = "Kevin Smith arrived";
    let entries = GlossaryComposer::new().compose(&snapshot(terms), original);
    let segment = TestDataGenerator::segment("s1", original);
    let ctx = build_context(&OverlayConfig::default(), std::slice::from_ref(&segment), entries);
    let pack = ctx.pack("s1").unwrap();

    assert_eq!(pack.masked, "__E#1__ arrived");
    assert_eq!(pack.locks.len(), 1);
    assert_eq!(pack.locks.values().next().unwrap().target, "케빈 스미스");
    let original = ctx.pieces("s1").unwrap().term_ranges(None);
    assert_eq!(original.len(), 1);
    assert_eq!(original[0].range, 0..11, "应遮蔽 11 个字符的整段");

    println!("✅ Longest match test passed");
}

/// 测试原样翻译时的往返即目标词替换
#[test]
fn test_identity_translation_substitutes_targets() {
    let terms = vec![
        TermBuilder::new("seoul", "서울").source("首尔").masked().build(),
        TermBuilder::new("busan", "부산").source("釜山").masked().build(),
    ];
    let (text, tagged) = round_trip(terms, "从首尔到釜山", |masked| masked.to_string());

    assert_eq!(text, "从서울到부산");
    assert_eq!(
        tagged,
        vec![("서울".to_string(), "서울".to_string()), ("부산".to_string(), "부산".to_string())]
    );

    println!("✅ Identity round trip test passed");
}

/// 测试被破坏的占位符
#[test]
fn test_damaged_tokens_are_repaired() {
    let terms = vec![TermBuilder::new("seoul", "서울").source("首尔").masked().build()];

    let damaged = ["__E # 1__으로 갔다", "__E#１__으로 갔다", "E#1__으로 갔다"];
    for output in damaged {
        let (text, _) = round_trip(terms.clone(), "去首尔", |_| output.to_string());
        assert_eq!(text, "서울로 갔다", "应修复 {:?}", output);
    }

    let (text, _) = round_trip(terms, "去首尔", |_| "__E#1__으로 __E#7__".to_string());
    assert_eq!(text, "서울로 __E#7__", "未知编号必须原样保留");

    println!("✅ Damaged token test passed");
}

/// 测试收音与 ㄹ 收音的助词选择
#[test]
fn test_batchim_and_rieul_particles() {
    let terms = vec![
        TermBuilder::new("seoul", "서울").source("首尔").masked().build(),
        TermBuilder::new("person", "사람").source("那人").masked().build(),
    ];
    let (text, _) = round_trip(terms, "去首尔的那人", |_| "__E#1__으로 간 __E#2__는".to_string());
    assert_eq!(text, "서울로 간 사람은");

    println!("✅ Particle selection test passed");
}

/// 测试互相重叠的变体不会吞掉已是规范写法的术语
#[test]
fn test_overlapping_variants_respect_canonical_terms() {
    let terms = vec![
        TermBuilder::new("kai", "가이").source("凯").variants(&["카이", "케이"]).build(),
        TermBuilder::new("k", "케이").source("k").build(),
    ];
    let (text, tagged) = round_trip(terms, "凯和k,凯", |_| "카이와 케이, 카이의 친구".to_string());

    assert_eq!(text, "가이와 케이, 가이의 친구");
    let targets: Vec<&str> = tagged.iter().map(|(_, t)| t.as_str()).collect();
    assert_eq!(targets.iter().filter(|t| **t == "가이").count(), 2);
    assert_eq!(targets.iter().filter(|t| **t == "케이").count(), 1);
    assert!(tagged.iter().all(|(slice, target)| slice == target));

    println!("✅ Overlapping variants test passed");
}

/// 测试已规范的译文保持不变
#[test]
fn test_canonical_output_is_noop() {
    let terms = vec![TermBuilder::new("kevin", "케빈").source("凯文").variants(&["케이빈", "Kevin"]).build()];
    let router = router();
    let original = "凯文来了";
    let entries = GlossaryComposer::new().compose(&snapshot(terms), original);
    let segment = TestDataGenerator::segment("s1", original);
    let ctx = build_context(router.config(), std::slice::from_ref(&segment), entries);
    let (pieces, pack, names) = ctx.parts_for(&segment);

    let restored = router.restore_output(&pack, &pieces, &names, "케빈이 왔다", &EngineTag::Afm);
    assert_eq!(restored.text, "케빈이 왔다");
    assert!(restored.pre_normalized_text.is_none());
    let meta = restored.highlight_metadata.unwrap();
    assert!(meta.final_term_ranges.iter().all(|r| r.kind != TermRangeKind::Normalized));

    println!("✅ Canonical no-op test passed");
}

/// 测试同一页的多个段落共享一次遮蔽计数
#[tokio::test]
async fn test_page_context_tokens_are_unique() {
    let store = InMemoryGlossaryStore::new(TestDataGenerator::novel_terms(), Vec::new());
    let segments: Vec<Segment> = TestDataGenerator::segments(&["首尔", "去首尔", "首尔和首尔"]);
    let ctx = glossa_overlay::translation::core::prepare_masking_context(
        &store,
        &OverlayConfig::default(),
        &segments,
        &Default::default(),
    )
    .await;

    let tokens: Vec<&String> = ctx.masked_packs.iter().flat_map(|p| p.locks.keys()).collect();
    let unique: BTreeSet<&String> = tokens.iter().copied().collect();
    assert_eq!(tokens.len(), 4);
    assert_eq!(unique.len(), 4, "同一次遮蔽中占位符不能重复");

    println!("✅ Unique token test passed");
}
