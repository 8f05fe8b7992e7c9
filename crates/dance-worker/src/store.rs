//! In-memory job registry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use dance_models::{Job, JobId, JobStatus};

use crate::error::{WorkerError, WorkerResult};

/// Shared map of job records. Cloning yields another handle to the same map.
#[derive(Debug, Clone, Default)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, job: Job) {
        self.jobs.write().await.insert(job.id.clone(), job);
    }

    /// Snapshot of a job record.
    pub async fn get(&self, id: &JobId) -> WorkerResult<Job> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| WorkerError::not_found(id))
    }

    pub async fn contains(&self, id: &JobId) -> bool {
        self.jobs.read().await.contains_key(id)
    }

    /// All jobs, oldest first.
    pub async fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    /// Apply `f` to a job under the write lock.
    pub async fn update<T>(
        &self,
        id: &JobId,
        f: impl FnOnce(&mut Job) -> WorkerResult<T>,
    ) -> WorkerResult<T> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(id).ok_or_else(|| WorkerError::not_found(id))?;
        f(job)
    }

    pub async fn remove(&self, id: &JobId) -> WorkerResult<Job> {
        self.jobs
            .write()
            .await
            .remove(id)
            .ok_or_else(|| WorkerError::not_found(id))
    }

    pub async fn count_by_status(&self, status: JobStatus) -> usize {
        self.jobs
            .read()
            .await
            .values()
            .filter(|job| job.status() == status)
            .count()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dance_models::ConfidenceParams;

    fn job(name: &str) -> Job {
        Job::new(
            JobId::new(),
            name.to_string(),
            format!("/tmp/{}", name),
            ConfidenceParams::default(),
        )
    }

    #[tokio::test]
    async fn test_insert_get_remove() {
        let store = JobStore::new();
        let job = job("a.mp4");
        let id = job.id.clone();
        store.insert(job).await;

        assert_eq!(store.get(&id).await.unwrap().input_filename, "a.mp4");
        store.remove(&id).await.unwrap();
        assert!(matches!(store.get(&id).await, Err(WorkerError::NotFound(_))));
        assert!(matches!(store.remove(&id).await, Err(WorkerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_and_count() {
        let store = JobStore::new();
        let job = job("a.mp4");
        let id = job.id.clone();
        store.insert(job).await;

        store
            .update(&id, |job| job.start_processing().map_err(Into::into))
            .await
            .unwrap();
        assert_eq!(store.count_by_status(JobStatus::Processing).await, 1);
        assert_eq!(store.count_by_status(JobStatus::Queued).await, 0);

        let again = store
            .update(&id, |job| job.start_processing().map_err(Into::into))
            .await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn test_list_is_ordered_by_creation() {
        let store = JobStore::new();
        let mut ids = Vec::new();
        for name in ["1.mp4", "2.mp4", "3.mp4"] {
            let job = job(name);
            ids.push(job.id.clone());
            store.insert(job).await;
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let listed: Vec<JobId> = store.list().await.into_iter().map(|j| j.id).collect();
        assert_eq!(listed, ids);
    }
}
