//! 运行级取消登记表
//!
//! 每次 `translate_stream` 以运行 ID 登记一个取消句柄。取消会置位标志、
//! 唤醒等待者并中止正在消费引擎流的任务；重复取消或取消已结束的运行都不做任何事。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tokio::sync::Notify;
use tokio::task::AbortHandle;

/// 单次运行的取消句柄
#[derive(Debug, Default)]
pub struct CancellationHandle {
    cancelled: AtomicBool,
    notify: Notify,
    task: Mutex<Option<AbortHandle>>,
}

impl CancellationHandle {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// 置位并中止已绑定的任务；返回本次调用是否真正触发了取消
    pub fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(task) = self.task.lock().unwrap_or_else(|p| p.into_inner()).take() {
            task.abort();
        }
        self.notify.notify_waiters();
        true
    }

    /// 绑定消费任务；已取消时立即中止
    pub fn attach(&self, task: AbortHandle) {
        if self.is_cancelled() {
            task.abort();
            return;
        }
        *self.task.lock().unwrap_or_else(|p| p.into_inner()) = Some(task);
    }

    /// 等待取消信号
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// 按运行 ID 索引的取消登记表
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    runs: DashMap<String, Arc<CancellationHandle>>,
}

static GLOBAL_REGISTRY: Lazy<Arc<CancellationRegistry>> = Lazy::new(|| Arc::new(CancellationRegistry::new()));

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 进程级共享的登记表
    pub fn global() -> Arc<CancellationRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// 登记一次运行；同一 ID 再次登记会替换旧句柄
    pub fn register(&self, run_id: &str) -> Arc<CancellationHandle> {
        let handle = Arc::new(CancellationHandle::default());
        if let Some(previous) = self.runs.insert(run_id.to_string(), Arc::clone(&handle)) {
            tracing::debug!("运行 {} 重复登记，旧句柄作废", run_id);
            previous.cancel();
        }
        handle
    }

    /// 取消运行；未登记或已取消时什么也不做
    pub fn cancel(&self, run_id: &str) -> bool {
        match self.runs.get(run_id).map(|h| Arc::clone(h.value())) {
            Some(handle) => {
                let fired = handle.cancel();
                if fired {
                    tracing::info!("运行 {} 已取消", run_id);
                }
                fired
            }
            None => false,
        }
    }

    /// 运行结束时注销；只移除与 `handle` 相同的句柄
    pub fn deregister(&self, run_id: &str, handle: &Arc<CancellationHandle>) {
        self.runs.remove_if(run_id, |_, current| Arc::ptr_eq(current, handle));
    }

    pub fn is_registered(&self, run_id: &str) -> bool {
        self.runs.contains_key(run_id)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// 离开作用域时注销运行
pub(crate) struct RegistrationGuard {
    registry: Arc<CancellationRegistry>,
    run_id: String,
    handle: Arc<CancellationHandle>,
}

impl RegistrationGuard {
    pub(crate) fn new(registry: Arc<CancellationRegistry>, run_id: &str) -> Self {
        let handle = registry.register(run_id);
        Self { registry, run_id: run_id.to_string(), handle }
    }

    pub(crate) fn handle(&self) -> &Arc<CancellationHandle> {
        &self.handle
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.deregister(&self.run_id, &self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cancel_is_idempotent() {
        let registry = CancellationRegistry::new();
        let handle = registry.register("run-1");

        assert!(registry.cancel("run-1"));
        assert!(!registry.cancel("run-1"), "重复取消不应再次触发");
        assert!(!registry.cancel("unknown"));
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_guard_deregisters_on_drop() {
        let registry = Arc::new(CancellationRegistry::new());
        {
            let _guard = RegistrationGuard::new(Arc::clone(&registry), "run-2");
            assert!(registry.is_registered("run-2"));
        }
        assert!(registry.is_empty());
        assert!(!registry.cancel("run-2"), "已结束的运行取消应为空操作");
    }

    #[test]
    fn test_reregister_keeps_newer_handle() {
        let registry = Arc::new(CancellationRegistry::new());
        let old = RegistrationGuard::new(Arc::clone(&registry), "run-3");
        let new = RegistrationGuard::new(Arc::clone(&registry), "run-3");
        assert!(old.handle().is_cancelled());
        drop(old);
        assert!(registry.is_registered("run-3"), "旧句柄注销不能移除新句柄");
        drop(new);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_aborts_attached_task() {
        let registry = CancellationRegistry::new();
        let handle = registry.register("run-4");
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        handle.attach(task.abort_handle());

        let waiter = {
            let handle = Arc::clone(&handle);
            tokio::spawn(async move { handle.cancelled().await })
        };
        tokio::task::yield_now().await;
        registry.cancel("run-4");

        assert!(task.await.unwrap_err().is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }
}
