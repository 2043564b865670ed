//! Background import execution.
//!
//! The supervisor is the owning side of every import task: it holds the
//! process-wide concurrency semaphore, the per-wordbook in-flight table and
//! a shutdown receiver. The HTTP handler gets an `ImportJob` back immediately
//! and never blocks on the work itself.

pub mod import_runner;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, Semaphore};

use crate::config::ImportConfig;
use crate::parser::ImportFormat;
use crate::store::operations::imports::{ImportJob, ImportStatus};
use crate::store::{Store, StoreError};

#[derive(Debug)]
pub enum StartError {
    /// Another import is already processing this wordbook.
    AlreadyRunning { import_id: u64 },
    Store(StoreError),
}

impl From<StoreError> for StartError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

pub struct ImportSupervisor {
    store: Arc<Store>,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashMap<u64, u64>>>,
    batch_size: usize,
    shutdown_tx: broadcast::Sender<()>,
}

impl ImportSupervisor {
    pub fn new(
        store: Arc<Store>,
        config: &ImportConfig,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            store,
            semaphore: Arc::new(Semaphore::new(config.concurrency)),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            batch_size: config.batch_size,
            shutdown_tx,
        }
    }

    /// Create the job row and enqueue the background task. Returns after the
    /// job exists; the caller polls `Progress` from then on.
    ///
    /// 并发规则：同一词库同时只允许一个导入；跨词库受进程级信号量限制。
    pub fn start(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        format: ImportFormat,
        wordbook_id: Option<u64>,
    ) -> Result<ImportJob, StartError> {
        let target = match wordbook_id {
            Some(id) => self.store.get_wordbook(id)?,
            None => self.store.active_wordbook()?,
        };

        let Some(book) = target else {
            // 任务照常创建：错误记录在 job 里而不是抛给调用方（调用方已拿到 id）
            let job = self.store.create_import_job(filename, None)?;
            let failed = self.store.update_import_job(job.id, |j| {
                j.status = ImportStatus::Failed;
                j.finished_at = Some(chrono::Utc::now());
                j.message = Some("no active wordbook".to_string());
            })?;
            return Ok(failed);
        };

        {
            let mut in_flight = self.in_flight.lock().expect("in-flight table poisoned");
            if let Some(running) = in_flight.get(&book.id) {
                return Err(StartError::AlreadyRunning {
                    import_id: *running,
                });
            }
            let job = self.store.create_import_job(filename, Some(book.id))?;
            in_flight.insert(book.id, job.id);
            self.spawn_task(job.id, book.id, bytes, format);
            Ok(job)
        }
    }

    fn spawn_task(&self, job_id: u64, wordbook_id: u64, bytes: Vec<u8>, format: ImportFormat) {
        let store = self.store.clone();
        let semaphore = self.semaphore.clone();
        let in_flight = self.in_flight.clone();
        let batch_size = self.batch_size;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    mark_failed(&store, job_id, "import queue is shut down");
                    in_flight
                        .lock()
                        .expect("in-flight table poisoned")
                        .remove(&wordbook_id);
                    return;
                }
            };

            // 客户端断开不会取消导入；只有进程退出会中断它
            tokio::select! {
                _ = import_runner::run(&store, job_id, wordbook_id, bytes, format, batch_size) => {}
                _ = shutdown_rx.recv() => {
                    tracing::warn!(job_id, "import interrupted by shutdown");
                    mark_failed(&store, job_id, "process shutting down");
                }
            }

            drop(permit);
            in_flight
                .lock()
                .expect("in-flight table poisoned")
                .remove(&wordbook_id);
        });
    }
}

fn mark_failed(store: &Store, job_id: u64, reason: &str) {
    let result = store.update_import_job(job_id, |job| {
        job.status = ImportStatus::Failed;
        job.finished_at = Some(chrono::Utc::now());
        job.message = Some(reason.to_string());
    });
    // 任务可能已经自行终止；终态不可变更属于预期情况
    if let Err(StoreError::Precondition(_)) = result {
        return;
    }
    if let Err(error) = result {
        tracing::error!(job_id, error = %error, "failed to mark import job as failed");
    }
}
