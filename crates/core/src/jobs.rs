use crate::error::StoreError;
use crate::models::Job;
use crate::traits::JobStore;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Job registry for a single-process deployment.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn get(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().await.get(job_id).cloned())
    }

    async fn set(&self, job: Job) -> Result<(), StoreError> {
        self.jobs.write().await.insert(job.job_id.clone(), job);
        Ok(())
    }

    async fn delete(&self, job_id: &str) -> Result<bool, StoreError> {
        Ok(self.jobs.write().await.remove(job_id).is_some())
    }

    /// Oldest first.
    async fn list(&self) -> Result<Vec<Job>, StoreError> {
        let mut jobs = self.jobs.read().await.values().cloned().collect::<Vec<_>>();
        jobs.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.job_id.cmp(&right.job_id))
        });
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete_round() {
        let store = InMemoryJobStore::new();
        store.set(Job::new("job-1", "manual.pdf")).await.expect("set");

        let job = store.get("job-1").await.expect("get").expect("present");
        assert_eq!(job.filename, "manual.pdf");
        assert_eq!(store.list().await.expect("list").len(), 1);

        assert!(store.delete("job-1").await.expect("delete"));
        assert!(!store.delete("job-1").await.expect("delete"));
        assert!(store.get("job-1").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn set_replaces_existing_job() {
        let store = InMemoryJobStore::new();
        let mut job = Job::new("job-1", "manual.pdf");
        store.set(job.clone()).await.expect("set");

        job.progress_percent = 40.0;
        store.set(job).await.expect("set");

        let jobs = store.list().await.expect("list");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].progress_percent, 40.0);
    }
}
