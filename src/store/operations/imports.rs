use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: u64,
    pub wordbook_id: Option<u64>,
    pub filename: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: ImportStatus,
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub message: Option<String>,
}

impl ImportJob {
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, ImportStatus::Completed | ImportStatus::Failed)
    }

    /// Derived from monotonic counters, so it never decreases; terminal
    /// jobs always report 100.
    pub fn progress_percent(&self) -> f64 {
        if self.is_terminal() {
            return 100.0;
        }
        let processed = (self.succeeded + self.failed + self.skipped) as f64;
        (100.0 * processed / self.total.max(1) as f64).clamp(0.0, 100.0)
    }
}

impl Store {
    pub fn create_import_job(
        &self,
        filename: &str,
        wordbook_id: Option<u64>,
    ) -> Result<ImportJob, StoreError> {
        let id = self.allocate_id("imports")?;
        let job = ImportJob {
            id,
            wordbook_id,
            filename: filename.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            status: ImportStatus::Pending,
            total: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            message: None,
        };
        self.imports
            .insert(keys::id_key(id).as_bytes(), Self::serialize(&job)?)?;
        Ok(job)
    }

    pub fn get_import_job(&self, import_id: u64) -> Result<Option<ImportJob>, StoreError> {
        match self.imports.get(keys::id_key(import_id).as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Most recent first. Ids are allocation-ordered, so a reverse scan is
    /// creation order.
    pub fn list_import_jobs(&self, limit: usize) -> Result<Vec<ImportJob>, StoreError> {
        let mut jobs = Vec::new();
        for item in self.imports.iter().rev() {
            let (_, raw) = item?;
            jobs.push(Self::deserialize::<ImportJob>(&raw)?);
            if jobs.len() >= limit {
                break;
            }
        }
        Ok(jobs)
    }

    /// Apply a mutation to a non-terminal job. Terminal rows are immutable.
    pub fn update_import_job(
        &self,
        import_id: u64,
        mutate: impl FnOnce(&mut ImportJob),
    ) -> Result<ImportJob, StoreError> {
        let mut job = self.get_import_job(import_id)?.ok_or_else(|| {
            StoreError::NotFound {
                entity: "import".into(),
                key: import_id.to_string(),
            }
        })?;
        if job.is_terminal() {
            return Err(StoreError::Precondition(format!(
                "import job {import_id} already finished"
            )));
        }
        mutate(&mut job);
        self.imports
            .insert(keys::id_key(import_id).as_bytes(), Self::serialize(&job)?)?;
        Ok(job)
    }

    pub fn delete_import_job(&self, import_id: u64) -> Result<(), StoreError> {
        let job = self.get_import_job(import_id)?.ok_or_else(|| {
            StoreError::NotFound {
                entity: "import".into(),
                key: import_id.to_string(),
            }
        })?;
        if !job.is_terminal() {
            return Err(StoreError::Precondition(
                "cannot delete a running import job".into(),
            ));
        }
        self.imports.remove(keys::id_key(import_id).as_bytes())?;
        Ok(())
    }
}
