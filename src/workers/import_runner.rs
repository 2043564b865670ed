//! The actual import loop: Parser → Store in bounded batches, with one retry
//! per batch and cumulative, monotonic progress bookkeeping.

use std::collections::HashMap;

use chrono::Utc;

use crate::constants::IMPORT_MAX_ROW_ERRORS;
use crate::parser::{self, ImportFormat};
use crate::store::operations::imports::ImportStatus;
use crate::store::operations::words::{BulkOutcome, NewWord};
use crate::store::Store;

pub async fn run(
    store: &Store,
    job_id: u64,
    wordbook_id: u64,
    bytes: Vec<u8>,
    format: ImportFormat,
    batch_size: usize,
) {
    let filename = store
        .get_import_job(job_id)
        .ok()
        .flatten()
        .map(|job| job.filename)
        .unwrap_or_default();

    let stream = match parser::parse(&bytes, format, Some(&filename)) {
        Ok(stream) => stream,
        Err(error) => {
            tracing::warn!(job_id, error = %error, "import parse failed");
            finish(store, job_id, ImportStatus::Failed, Some(error.to_string()), None);
            return;
        }
    };
    let total_hint = stream.total_hint();

    let update = store.update_import_job(job_id, |job| {
        job.status = ImportStatus::Processing;
        if let Some(total) = total_hint {
            job.total = total;
        }
    });
    if update.is_err() {
        // 任务已被外部终止（如进程关闭），不再继续写入
        return;
    }

    let mut succeeded = 0u64;
    let mut failed = 0u64;
    let mut skipped = 0u64;
    let mut row_errors: Vec<String> = Vec::new();

    let mut batch: Vec<(usize, NewWord)> = Vec::with_capacity(batch_size);
    let mut hints: HashMap<usize, String> = HashMap::new();
    let mut stream = stream;

    loop {
        batch.clear();
        hints.clear();

        // 逐条取满一批；行级错误立即计入 failed
        for (row, result) in stream.by_ref() {
            match result {
                Ok(record) => {
                    if let Some(hint) = record.hint {
                        hints.insert(row, hint);
                    }
                    batch.push((row, record.word));
                    if batch.len() >= batch_size {
                        break;
                    }
                }
                Err(row_error) => {
                    failed += 1;
                    if row_errors.len() < IMPORT_MAX_ROW_ERRORS {
                        row_errors
                            .push(format!("row {}: {}", row_error.row, row_error.reason));
                    }
                }
            }
        }
        let exhausted = batch.len() < batch_size;

        if !batch.is_empty() {
            let outcome = upsert_batch_with_retry(store, wordbook_id, &batch);
            match outcome {
                Some(outcome) => {
                    succeeded += outcome.inserted.len() as u64;
                    skipped += outcome.skipped;
                    failed += outcome.failed.len() as u64;
                    for (row, reason) in &outcome.failed {
                        if row_errors.len() < IMPORT_MAX_ROW_ERRORS {
                            row_errors.push(format!("row {row}: {reason}"));
                        }
                    }
                    for (row, word_id) in &outcome.inserted {
                        let hint = hints.get(row).cloned();
                        if let Err(error) = store.create_card_if_missing(
                            *word_id,
                            crate::store::operations::cards::CardTemplate::Basic,
                            hint,
                        ) {
                            tracing::error!(job_id, word_id, error = %error, "card creation failed");
                        }
                    }
                }
                None => {
                    // 批次两次失败：整批计为 failed，继续后续批次
                    failed += batch.len() as u64;
                    if row_errors.len() < IMPORT_MAX_ROW_ERRORS {
                        row_errors.push(format!(
                            "rows {}..{}: batch write failed twice",
                            batch.first().map(|(r, _)| *r).unwrap_or_default(),
                            batch.last().map(|(r, _)| *r).unwrap_or_default()
                        ));
                    }
                }
            }

            let progress = store.update_import_job(job_id, |job| {
                job.succeeded = succeeded;
                job.failed = failed;
                job.skipped = skipped;
            });
            if progress.is_err() {
                return;
            }
        }

        if exhausted {
            break;
        }
        // 批间让出调度器，避免长导入饿死其他任务
        tokio::task::yield_now().await;
    }

    let message = if row_errors.is_empty() {
        None
    } else {
        Some(row_errors.join("; "))
    };
    finish(
        store,
        job_id,
        ImportStatus::Completed,
        message,
        Some((succeeded, failed, skipped, total_hint)),
    );
}

fn upsert_batch_with_retry(
    store: &Store,
    wordbook_id: u64,
    batch: &[(usize, NewWord)],
) -> Option<BulkOutcome> {
    match store.bulk_upsert_words(wordbook_id, batch) {
        Ok(outcome) => Some(outcome),
        Err(first) => {
            tracing::warn!(wordbook_id, error = %first, "batch failed, retrying once");
            match store.bulk_upsert_words(wordbook_id, batch) {
                Ok(outcome) => Some(outcome),
                Err(second) => {
                    tracing::error!(wordbook_id, error = %second, "batch failed twice");
                    None
                }
            }
        }
    }
}

fn finish(
    store: &Store,
    job_id: u64,
    status: ImportStatus,
    message: Option<String>,
    counters: Option<(u64, u64, u64, Option<u64>)>,
) {
    let result = store.update_import_job(job_id, |job| {
        job.status = status;
        job.finished_at = Some(Utc::now());
        if message.is_some() {
            job.message = message.clone();
        }
        if let Some((succeeded, failed, skipped, total_hint)) = counters {
            job.succeeded = succeeded;
            job.failed = failed;
            job.skipped = skipped;
            // 终态收敛：无提示时 total 等于实际处理数
            job.total = total_hint.unwrap_or(succeeded + failed + skipped);
        }
    });
    match result {
        Ok(job) => {
            tracing::info!(
                job_id,
                status = ?job.status,
                total = job.total,
                succeeded = job.succeeded,
                failed = job.failed,
                skipped = job.skipped,
                "import finished"
            );
        }
        Err(error) => {
            tracing::warn!(job_id, error = %error, "could not finalize import job");
        }
    }
}
