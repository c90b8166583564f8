//! 翻译引擎接口
//!
//! 引擎对核心来说是一个黑盒：输入遮蔽后的段落，输出按批到达的译文流。
//! 具体的网络协议不在这里处理。
//!
//! ## 约定
//! - 结果流必须是 `'static` 的，路由器会在独立任务里消费它；
//! - 流中的 `Err` 会终止本次运行，已收到的结果仍然有效；
//! - `segment_id` 必须来自请求中的段落，否则记为意外 ID。

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::translation::error::TranslationResult;
use crate::translation::model::{EngineResult, EngineTag, Segment, TranslationOptions};

/// 引擎返回的结果流
pub type EngineResultStream = BoxStream<'static, TranslationResult<Vec<EngineResult>>>;

/// 翻译引擎
pub trait TranslationEngine: Send + Sync {
    fn tag(&self) -> EngineTag;

    /// 引擎能否原样保留占位符；不能时路由器直接把目标词写进请求文本
    fn mask_person(&self) -> bool {
        true
    }

    /// 发起一次翻译，返回结果流
    fn translate<'a>(
        &'a self,
        run_id: &'a str,
        segments: &'a [Segment],
        options: &'a TranslationOptions,
    ) -> BoxFuture<'a, TranslationResult<EngineResultStream>>;
}

/// 引擎调用统计
///
/// 计数器只增不减，使用 Relaxed 内存顺序。
#[derive(Debug, Default)]
pub struct EngineStats {
    /// 发起的运行次数
    pub runs_started: AtomicUsize,
    /// 收到的结果批次数
    pub batches_received: AtomicUsize,
    /// 收到的段落结果数
    pub results_received: AtomicUsize,
    /// 发送给引擎的字符总数
    pub characters_sent: AtomicUsize,
    /// 从引擎收到的字符总数
    pub characters_received: AtomicUsize,
    /// 以错误结束的运行次数
    pub engine_errors: AtomicUsize,
    /// 流消费总耗时（微秒）
    pub total_processing_time: AtomicU64,
}

impl EngineStats {
    pub fn inc_runs_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录一个批次及其中的字符数
    pub fn record_batch(&self, results: &[EngineResult]) {
        self.batches_received.fetch_add(1, Ordering::Relaxed);
        self.results_received.fetch_add(results.len(), Ordering::Relaxed);
        let chars: usize = results.iter().map(|r| r.text.chars().count()).sum();
        self.characters_received.fetch_add(chars, Ordering::Relaxed);
    }

    pub fn add_characters_sent(&self, count: usize) {
        self.characters_sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_engine_errors(&self) {
        self.engine_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_processing_time(&self, duration: Duration) {
        self.total_processing_time.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// 平均每个批次的段落数
    pub fn average_batch_size(&self) -> f64 {
        let batches = self.batches_received.load(Ordering::Relaxed);
        if batches == 0 {
            0.0
        } else {
            self.results_received.load(Ordering::Relaxed) as f64 / batches as f64
        }
    }

    /// 重置统计信息
    pub fn reset(&mut self) {
        *self = Default::default();
    }
}
