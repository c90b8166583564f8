//! 流式翻译路由器
//!
//! 一次 `translate_stream` 称为一次运行，由调用方给定的运行 ID 标识。
//! 运行的状态依次经过：空闲 → 已调度 → 流式接收 → 完成 / 失败 / 取消。
//!
//! ## 流程
//!
//! 1. 先查缓存，命中的段落立即发出 `CachedHit` 和 `Final`；
//! 2. 其余段落发出 `RequestScheduled`，取得遮蔽上下文，每段发一个 `Partial` 占位；
//! 3. 引擎结果流在独立任务中消费，任务登记到取消登记表；
//! 4. 每个结果经过占位符修复、还原、规范化后发出 `Final` 并写入缓存；
//! 5. 流结束后检查取消、意外 ID 与缺失 ID，决定发出 `Completed` 还是失败。
//!
//! ## 事件顺序
//!
//! 同一运行内所有载荷事件的 `sequence` 严格递增，反映发出顺序。
//! 缓存命中在任何引擎结果之前同步发出。取消之后不会再发出任何事件。

use std::collections::{BTreeSet, HashMap};
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio::sync::mpsc;

use super::cancellation::{CancellationRegistry, RegistrationGuard};
use super::context::{prepare_masking_context, MaskingContext};
use super::engine::{EngineStats, TranslationEngine};
use crate::translation::config::{constants, OverlayConfig};
use crate::translation::error::{EngineStreamError, TranslationError, TranslationResult};
use crate::translation::glossary::GlossaryStore;
use crate::translation::masking::{find_tokens, MaskingEngine};
use crate::translation::model::{
    EngineResult, EngineTag, MaskedPack, NameGlossary, Segment, SegmentPieces, SegmentTranslation, StreamEventKind,
    TermHighlightMetadata, TermRange, TranslationOptions, TranslationStreamError, TranslationStreamEvent,
    TranslationStreamPayload, TranslationStreamSummary,
};
use crate::translation::normalization::{collapse_spaces_when_isolated, translate_ranges, NormalizationEngine};
use crate::translation::storage::{cache_key, CacheStore};

/// 引擎流在路由器与消费任务之间的缓冲批次数
const STREAM_BUFFER: usize = 16;

/// 等待引擎结果的段落
struct PendingSegment {
    segment: Segment,
    pieces: SegmentPieces,
    pack: MaskedPack,
    names: Vec<NameGlossary>,
}

/// 引擎流的结束方式
enum StreamOutcome {
    Drained,
    Cancelled,
    Failed(TranslationError),
}

/// 翻译路由器
///
/// 持有已注册的引擎、术语库与缓存。路由器本身不保存运行状态，
/// 可以被多个并发运行共享。
pub struct TranslationRouter {
    engines: HashMap<EngineTag, Arc<dyn TranslationEngine>>,
    glossary_store: Arc<dyn GlossaryStore>,
    cache: Option<Arc<dyn CacheStore>>,
    config: OverlayConfig,
    registry: Arc<CancellationRegistry>,
    stats: Arc<EngineStats>,
}

impl TranslationRouter {
    /// 创建路由器，使用进程级取消登记表
    pub fn new(
        engines: Vec<Arc<dyn TranslationEngine>>,
        glossary_store: Arc<dyn GlossaryStore>,
        cache: Option<Arc<dyn CacheStore>>,
        config: OverlayConfig,
    ) -> Self {
        let engines = engines.into_iter().map(|engine| (engine.tag(), engine)).collect();
        Self {
            engines,
            glossary_store,
            cache,
            config,
            registry: CancellationRegistry::global(),
            stats: Arc::new(EngineStats::default()),
        }
    }

    /// 使用独立的取消登记表
    pub fn with_registry(mut self, registry: Arc<CancellationRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CancellationRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn cache(&self) -> Option<&Arc<dyn CacheStore>> {
        self.cache.as_ref()
    }

    pub fn engine_tags(&self) -> Vec<EngineTag> {
        let mut tags: Vec<EngineTag> = self.engines.keys().cloned().collect();
        tags.sort();
        tags
    }

    /// 选择引擎：优先使用指定引擎，其次配置的默认引擎
    pub fn select_engine(&self, preferred: Option<&EngineTag>) -> TranslationResult<Arc<dyn TranslationEngine>> {
        if let Some(tag) = preferred {
            if let Some(engine) = self.engines.get(tag) {
                return Ok(Arc::clone(engine));
            }
            tracing::warn!("指定引擎 {} 未注册，尝试默认引擎", tag);
        }
        self.engines
            .get(&self.config.router.default_engine)
            .map(Arc::clone)
            .ok_or(TranslationError::NoAvailableEngine)
    }

    /// 为一组段落构建遮蔽上下文，结果可以在多个引擎之间复用
    pub async fn prepare_masking_context(&self, segments: &[Segment], options: &TranslationOptions) -> MaskingContext {
        prepare_masking_context(self.glossary_store.as_ref(), &self.config, segments, options).await
    }

    /// 取消运行；未登记或已结束的运行不受影响
    pub fn cancel(&self, run_id: &str) -> bool {
        self.registry.cancel(run_id)
    }

    // ========================================================================
    // 流式翻译
    // ========================================================================

    /// 执行一次流式翻译
    ///
    /// 成功时返回汇总并已发出 `Completed`。取消时返回 [`TranslationError::Cancelled`]，
    /// 引擎失败或结果流违反契约时，先为未完成的段落发出 `Failed` 再返回错误。
    pub async fn translate_stream<F>(
        &self,
        run_id: &str,
        segments: &[Segment],
        options: &TranslationOptions,
        preferred_engine: Option<&EngineTag>,
        masking_context: Option<&MaskingContext>,
        mut on_event: F,
    ) -> TranslationResult<TranslationStreamSummary>
    where
        F: FnMut(TranslationStreamEvent) + Send,
    {
        let engine = self.select_engine(preferred_engine)?;
        let engine_tag = engine.tag();
        let guard = RegistrationGuard::new(Arc::clone(&self.registry), run_id);
        let handle = Arc::clone(guard.handle());

        let mut sequence: u64 = 0;
        let mut summary = TranslationStreamSummary { total_count: segments.len(), ..Default::default() };

        // 缓存阶段
        let mut pending: Vec<&Segment> = Vec::new();
        for segment in segments {
            match self.lookup_cached(segment, &engine_tag, options) {
                Some(hit) => {
                    metrics::counter!("glossa.router.cache_hits").increment(1);
                    self.emit(&mut on_event, StreamEventKind::CachedHit).await;
                    sequence += 1;
                    let payload = final_payload(segment, &hit, sequence);
                    self.emit(&mut on_event, StreamEventKind::Final(payload)).await;
                    summary.cached_count += 1;
                }
                None => {
                    metrics::counter!("glossa.router.cache_misses").increment(1);
                    pending.push(segment);
                }
            }
        }

        if pending.is_empty() {
            tracing::debug!("运行 {} 全部命中缓存: {} 段", run_id, summary.cached_count);
            self.emit(&mut on_event, StreamEventKind::Completed).await;
            return Ok(summary);
        }

        self.emit(&mut on_event, StreamEventKind::RequestScheduled).await;

        let owned_context;
        let context = match masking_context {
            Some(ctx) => ctx,
            None => {
                let pending_owned: Vec<Segment> = pending.iter().map(|s| (*s).clone()).collect();
                owned_context = self.prepare_masking_context(&pending_owned, options).await;
                &owned_context
            }
        };

        for segment in &pending {
            sequence += 1;
            let payload = TranslationStreamPayload {
                segment_id: segment.id.clone(),
                original_text: segment.original_text.clone(),
                translated_text: None,
                pre_normalized_text: None,
                engine_id: engine_tag.clone(),
                sequence,
                highlight_metadata: None,
            };
            self.emit(&mut on_event, StreamEventKind::Partial(payload)).await;
        }

        if handle.is_cancelled() {
            tracing::info!("运行 {} 在发送请求前被取消", run_id);
            return Err(TranslationError::Cancelled(run_id.to_string()));
        }

        // 组装请求
        let mask_person = engine.mask_person();
        let mut order: Vec<String> = Vec::with_capacity(pending.len());
        let mut by_id: HashMap<String, PendingSegment> = HashMap::with_capacity(pending.len());
        let mut request: Vec<Segment> = Vec::with_capacity(pending.len());
        for segment in &pending {
            let (pieces, pack, names) = context.parts_for(segment);
            let text = if mask_person {
                pack.masked.clone()
            } else {
                crate::translation::masking::unlock_terms_safely(&pack.masked, &pack.locks)
            };
            request.push(segment.with_text(text));
            order.push(segment.id.clone());
            by_id.insert(segment.id.clone(), PendingSegment { segment: (*segment).clone(), pieces, pack, names });
        }

        self.stats.inc_runs_started();
        self.stats.add_characters_sent(request.iter().map(|s| s.original_text.chars().count()).sum());
        tracing::info!("运行 {} 发送 {} 段到引擎 {}", run_id, request.len(), engine_tag);

        let (tx, mut rx) = mpsc::channel::<TranslationResult<Vec<EngineResult>>>(STREAM_BUFFER);
        let task = {
            let engine = Arc::clone(&engine);
            let run_id = run_id.to_string();
            let options = options.clone();
            tokio::spawn(async move {
                let mut stream = match engine.translate(&run_id, &request, &options).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                };
                while let Some(batch) = stream.next().await {
                    let failed = batch.is_err();
                    if tx.send(batch).await.is_err() || failed {
                        break;
                    }
                }
            })
        };
        handle.attach(task.abort_handle());

        // 消费结果
        let started = Instant::now();
        let mut remaining: BTreeSet<String> = order.iter().cloned().collect();
        let mut unexpected: Vec<String> = Vec::new();
        let outcome = 'stream: loop {
            let next = tokio::select! {
                biased;
                _ = handle.cancelled() => break 'stream StreamOutcome::Cancelled,
                batch = rx.recv() => batch,
            };
            let batch = match next {
                None => break 'stream StreamOutcome::Drained,
                Some(Err(e)) => break 'stream StreamOutcome::Failed(e),
                Some(Ok(batch)) => batch,
            };
            self.stats.record_batch(&batch);

            for result in batch {
                if handle.is_cancelled() {
                    break 'stream StreamOutcome::Cancelled;
                }
                if !remaining.remove(&result.segment_id) {
                    tracing::warn!("运行 {} 收到意外的段落结果: {}", run_id, result.segment_id);
                    unexpected.push(result.segment_id);
                    continue;
                }
                let Some(entry) = by_id.get(&result.segment_id) else {
                    continue;
                };

                let translation =
                    self.restore_output(&entry.pack, &entry.pieces, &entry.names, &result.text, &engine_tag);
                sequence += 1;
                let payload = final_payload(&entry.segment, &translation, sequence);
                self.emit(&mut on_event, StreamEventKind::Final(payload)).await;
                if let Some(cache) = &self.cache {
                    cache.save(&cache_key(&entry.segment.id, &engine_tag, options), &translation);
                }
                metrics::counter!("glossa.router.segments_final").increment(1);
                summary.succeeded_count += 1;
            }
        };
        task.abort();
        self.stats.add_processing_time(started.elapsed());

        // 结束检查
        if matches!(outcome, StreamOutcome::Cancelled) || handle.is_cancelled() {
            tracing::info!("运行 {} 已取消，{} 段未完成", run_id, remaining.len());
            return Err(TranslationError::Cancelled(run_id.to_string()));
        }

        let error = match outcome {
            StreamOutcome::Failed(e) => {
                self.stats.inc_engine_errors();
                Some(e.with_context(run_id).logged())
            }
            _ if !unexpected.is_empty() => {
                Some(TranslationError::EngineStream(EngineStreamError::UnexpectedId(unexpected[0].clone())).logged())
            }
            _ if !remaining.is_empty() => {
                tracing::warn!("运行 {} 缺失 {} 段结果", run_id, remaining.len());
                Some(TranslationError::EngineStream(EngineStreamError::MissingIds(remaining.clone())))
            }
            _ => None,
        };

        if let Some(error) = error {
            for id in order.iter().filter(|id| remaining.contains(*id)) {
                let event = StreamEventKind::Failed {
                    segment_id: id.clone(),
                    error: TranslationStreamError::EngineFailure { code: None },
                };
                self.emit(&mut on_event, event).await;
                metrics::counter!("glossa.router.segments_failed").increment(1);
                summary.failed_count += 1;
            }
            return Err(error);
        }

        self.emit(&mut on_event, StreamEventKind::Completed).await;
        tracing::info!(
            "运行 {} 完成: 成功 {}，缓存 {}，共 {}",
            run_id,
            summary.succeeded_count,
            summary.cached_count,
            summary.total_count
        );
        Ok(summary)
    }

    async fn emit<F>(&self, on_event: &mut F, kind: StreamEventKind)
    where
        F: FnMut(TranslationStreamEvent) + Send,
    {
        on_event(TranslationStreamEvent::now(kind));
        if self.config.router.yield_between_events {
            tokio::task::yield_now().await;
        }
    }

    fn lookup_cached(
        &self,
        segment: &Segment,
        engine: &EngineTag,
        options: &TranslationOptions,
    ) -> Option<SegmentTranslation> {
        if options.bypass_cache {
            return None;
        }
        self.cache.as_ref()?.lookup(&cache_key(&segment.id, engine, options))
    }

    // ========================================================================
    // 还原
    // ========================================================================

    /// 把引擎输出还原为最终译文并计算高亮区间
    pub fn restore_output(
        &self,
        pack: &MaskedPack,
        pieces: &SegmentPieces,
        names: &[NameGlossary],
        text: &str,
        engine: &EngineTag,
    ) -> SegmentTranslation {
        let masking = MaskingEngine::new(&self.config.masking);
        let normalizer = NormalizationEngine::new(&self.config.normalization);

        let repaired = masking.normalize_damaged_tokens(text, &pack.locks);
        let original_term_ranges = pieces.term_ranges(None);

        let unmasked = masking.unmask_with_order(&repaired, pieces, &pack.locks, &pack.token_entries);
        let mut unmask_ranges = unmasked.ranges;
        if unmask_ranges.is_empty() && !pack.locks.is_empty() {
            unmask_ranges = MaskingEngine::map_masked_terms(pieces, &unmasked.text);
        }

        let protected: Vec<Range<usize>> = unmask_ranges.iter().map(|r| r.range.clone()).collect();
        let normalized = normalizer.normalize_with_order_protected(&unmasked.text, pieces, names, &protected);
        let normalization_changed = !normalized.deltas.is_empty() || !normalized.ranges.is_empty();

        let mut out = normalized.text;
        let mut final_ranges = translate_ranges(&unmask_ranges, &normalized.deltas, &out);
        final_ranges.extend(normalized.ranges);

        // 规范化之后仍残留的占位符
        let stray = find_tokens(&out).iter().any(|r| pack.locks.contains_key(&out[r.clone()]));
        if stray {
            let second = masking.unmask_with_order(&out, pieces, &pack.locks, &pack.token_entries);
            final_ranges = translate_ranges(&final_ranges, &second.deltas, &second.text);
            final_ranges.extend(second.ranges);
            out = second.text;
        }

        if pack.locks.len() == 1 {
            if let Some(lock) = pack.locks.values().next() {
                let (collapsed, deltas) = collapse_spaces_when_isolated(&out, &lock.target);
                if !deltas.is_empty() {
                    final_ranges = translate_ranges(&final_ranges, &deltas, &collapsed);
                    out = collapsed;
                }
            }
        }
        final_ranges.sort_by_key(|r| (r.range.start, r.range.end));

        let ratio = residual_source_ratio(&out);
        if ratio > constants::RESIDUAL_WARN_RATIO {
            tracing::warn!("段落 {} 译文残留原文比例过高: {:.2}", pack.segment.id, ratio);
        }

        let pre_normalized_text = normalization_changed.then(|| normalized.pre_normalized_text.clone());
        let pre_normalized_term_ranges = normalization_changed.then(|| {
            let mut ranges: Vec<TermRange> = unmask_ranges.clone();
            ranges.extend(normalized.pre_normalized_ranges.iter().cloned());
            ranges.sort_by_key(|r| (r.range.start, r.range.end));
            ranges
        });
        let highlight_metadata = (!original_term_ranges.is_empty() || !final_ranges.is_empty()).then(|| {
            TermHighlightMetadata {
                original_term_ranges,
                final_term_ranges: final_ranges,
                pre_normalized_term_ranges,
            }
        });

        SegmentTranslation {
            segment_id: pack.segment.id.clone(),
            engine: engine.clone(),
            text: out,
            pre_normalized_text,
            residual_source_ratio: ratio,
            highlight_metadata,
            created_at: chrono::Utc::now(),
        }
    }
}

fn final_payload(segment: &Segment, translation: &SegmentTranslation, sequence: u64) -> TranslationStreamPayload {
    TranslationStreamPayload {
        segment_id: segment.id.clone(),
        original_text: segment.original_text.clone(),
        translated_text: Some(translation.text.clone()),
        pre_normalized_text: translation.pre_normalized_text.clone(),
        engine_id: translation.engine.clone(),
        sequence,
        highlight_metadata: translation.highlight_metadata.clone(),
    }
}

/// 译文中汉字占字母数字字符的比例
pub fn residual_source_ratio(text: &str) -> f64 {
    let (han, total) = text.chars().filter(|c| c.is_alphanumeric()).fold((0usize, 0usize), |(han, total), c| {
        (han + usize::from(is_han(c)), total + 1)
    });
    if total == 0 {
        0.0
    } else {
        han as f64 / total as f64
    }
}

fn is_han(c: char) -> bool {
    matches!(c as u32, 0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF | 0x20000..=0x2A6DF)
}
