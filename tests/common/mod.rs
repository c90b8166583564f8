// 集成测试公共模块
//
// 提供术语/段落构造器、脚本化的假引擎和事件收集器

use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::StreamExt;
use url::Url;

use glossa_overlay::translation::config::OverlayConfig;
use glossa_overlay::translation::core::{CancellationRegistry, EngineResultStream, TranslationEngine, TranslationRouter};
use glossa_overlay::translation::error::{TranslationError, TranslationResult};
use glossa_overlay::translation::glossary::InMemoryGlossaryStore;
use glossa_overlay::translation::model::{
    EngineResult, EngineTag, MatchedTerm, Segment, StreamEventKind, TermSource, TranslationOptions,
    TranslationStreamEvent, TranslationStreamPayload,
};
use glossa_overlay::translation::storage::CacheStore;

// ============================================================================
// 数据构造
// ============================================================================

/// 术语构造器
pub struct TermBuilder {
    term: MatchedTerm,
}

impl TermBuilder {
    pub fn new(key: &str, target: &str) -> Self {
        Self {
            term: MatchedTerm { key: key.to_string(), target: target.to_string(), ..Default::default() },
        }
    }

    pub fn source(mut self, text: &str) -> Self {
        self.term.sources.push(TermSource::new(text));
        self
    }

    pub fn variants(mut self, variants: &[&str]) -> Self {
        self.term.variants = variants.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn masked(mut self) -> Self {
        self.term.pre_mask = true;
        self
    }

    pub fn build(self) -> MatchedTerm {
        self.term
    }
}

pub struct TestDataGenerator;

impl TestDataGenerator {
    pub fn segment(id: &str, text: &str) -> Segment {
        Segment::new(id, Url::parse("https://novel.example.com/chapter/1").unwrap(), 0, text)
    }

    pub fn segments(texts: &[&str]) -> Vec<Segment> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let mut seg = Self::segment(&format!("seg-{}", i), text);
                seg.index_in_page = i;
                seg
            })
            .collect()
    }

    /// 凯文（只规范化）与首尔（遮蔽）两条术语
    pub fn novel_terms() -> Vec<MatchedTerm> {
        vec![
            TermBuilder::new("kevin", "케빈").source("凯文").variants(&["케이빈", "Kevin"]).build(),
            TermBuilder::new("seoul", "서울").source("首尔").masked().build(),
        ]
    }
}

// ============================================================================
// 脚本化引擎
// ============================================================================

/// 按脚本返回结果的假引擎
///
/// 默认把请求文本经过 `transform` 后原样返回，每批 `batch_size` 段。
pub struct ScriptedEngine {
    tag: EngineTag,
    mask_person: bool,
    transform: Box<dyn Fn(&str) -> String + Send + Sync>,
    batch_size: usize,
    extra: Vec<EngineResult>,
    drop_ids: Vec<String>,
    fail_after: Option<usize>,
    hang_after: Option<usize>,
    requests: Mutex<Vec<Vec<Segment>>>,
}

impl ScriptedEngine {
    pub fn echo(tag: EngineTag) -> Self {
        Self {
            tag,
            mask_person: true,
            transform: Box::new(|s| s.to_string()),
            batch_size: 1,
            extra: Vec::new(),
            drop_ids: Vec::new(),
            fail_after: None,
            hang_after: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_transform(mut self, f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.transform = Box::new(f);
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn without_mask_person(mut self) -> Self {
        self.mask_person = false;
        self
    }

    /// 最后追加一批未请求的结果
    pub fn with_extra(mut self, segment_id: &str, text: &str) -> Self {
        self.extra.push(EngineResult::new(segment_id, text, self.tag.clone()));
        self
    }

    /// 不返回指定段落
    pub fn dropping(mut self, segment_id: &str) -> Self {
        self.drop_ids.push(segment_id.to_string());
        self
    }

    /// 发出 n 批之后以错误结束
    pub fn failing_after(mut self, batches: usize) -> Self {
        self.fail_after = Some(batches);
        self
    }

    /// 发出 n 批之后永远挂起
    pub fn hanging_after(mut self, batches: usize) -> Self {
        self.hang_after = Some(batches);
        self
    }

    /// 收到过的请求
    pub fn requests(&self) -> Vec<Vec<Segment>> {
        self.requests.lock().unwrap().clone()
    }
}

impl TranslationEngine for ScriptedEngine {
    fn tag(&self) -> EngineTag {
        self.tag.clone()
    }

    fn mask_person(&self) -> bool {
        self.mask_person
    }

    fn translate<'a>(
        &'a self,
        _run_id: &'a str,
        segments: &'a [Segment],
        _options: &'a TranslationOptions,
    ) -> BoxFuture<'a, TranslationResult<EngineResultStream>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(segments.to_vec());

            let results: Vec<EngineResult> = segments
                .iter()
                .filter(|s| !self.drop_ids.contains(&s.id))
                .map(|s| EngineResult::new(s.id.clone(), (self.transform)(&s.original_text), self.tag.clone()))
                .collect();
            let mut batches: Vec<TranslationResult<Vec<EngineResult>>> =
                results.chunks(self.batch_size).map(|chunk| Ok(chunk.to_vec())).collect();
            if !self.extra.is_empty() {
                batches.push(Ok(self.extra.clone()));
            }

            if let Some(n) = self.fail_after {
                batches.truncate(n);
                batches.push(Err(TranslationError::EngineError("scripted failure".to_string())));
            }

            let stream = futures::stream::iter(batches);
            match self.hang_after {
                Some(n) => Ok(stream.take(n).chain(futures::stream::pending()).boxed()),
                None => Ok(stream.boxed()),
            }
        })
    }
}

// ============================================================================
// 路由器与事件收集
// ============================================================================

/// 用独立取消登记表构建路由器
pub fn build_router(
    engines: Vec<Arc<dyn TranslationEngine>>,
    terms: Vec<MatchedTerm>,
    cache: Option<Arc<dyn CacheStore>>,
) -> TranslationRouter {
    TranslationRouter::new(engines, Arc::new(InMemoryGlossaryStore::new(terms, Vec::new())), cache, OverlayConfig::default())
        .with_registry(Arc::new(CancellationRegistry::new()))
}

/// 线程安全的事件收集器
#[derive(Clone, Default)]
pub struct EventCollector {
    events: Arc<Mutex<Vec<TranslationStreamEvent>>>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 交给 `translate_stream` 的回调
    pub fn sink(&self) -> impl FnMut(TranslationStreamEvent) + Send + 'static {
        let events = Arc::clone(&self.events);
        move |event| events.lock().unwrap().push(event)
    }

    pub fn events(&self) -> Vec<TranslationStreamEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<StreamEventKind> {
        self.events().into_iter().map(|e| e.kind).collect()
    }

    pub fn finals(&self) -> Vec<TranslationStreamPayload> {
        self.kinds()
            .into_iter()
            .filter_map(|k| match k {
                StreamEventKind::Final(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn failed_ids(&self) -> Vec<String> {
        self.kinds()
            .into_iter()
            .filter_map(|k| match k {
                StreamEventKind::Failed { segment_id, .. } => Some(segment_id),
                _ => None,
            })
            .collect()
    }

    pub fn count_where(&self, pred: impl Fn(&StreamEventKind) -> bool) -> usize {
        self.kinds().iter().filter(|k| pred(k)).count()
    }

    pub fn has_completed(&self) -> bool {
        self.count_where(|k| matches!(k, StreamEventKind::Completed)) > 0
    }

    pub fn sequences(&self) -> Vec<u64> {
        self.events().iter().filter_map(|e| e.sequence()).collect()
    }
}

pub struct AssertionHelper;

impl AssertionHelper {
    /// 序号严格递增
    pub fn assert_strictly_increasing(values: &[u64], description: &str) {
        for pair in values.windows(2) {
            assert!(pair[0] < pair[1], "{}: {:?} 不是严格递增", description, values);
        }
    }
}
