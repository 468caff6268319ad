use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use hookd::cluster::{ClusterClient, ClusterError};
use hookd::jobspec::{ConfigMap, Job};

/// Tracks environment variable mutations and restores originals on drop.
pub struct EnvGuard {
    originals: HashMap<String, Option<String>>,
}

impl EnvGuard {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self {
            originals: HashMap::new(),
        }
    }

    #[allow(dead_code)]
    pub fn set(&mut self, key: &str, value: &str) {
        self.capture(key);
        std::env::set_var(key, value);
    }

    #[allow(dead_code)]
    pub fn remove(&mut self, key: &str) {
        self.capture(key);
        std::env::remove_var(key);
    }

    fn capture(&mut self, key: &str) {
        if self.originals.contains_key(key) {
            return;
        }
        let original = std::env::var(key).ok();
        self.originals.insert(key.to_string(), original);
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, original) in self.originals.drain() {
            match original {
                Some(value) => std::env::set_var(&key, value),
                None => std::env::remove_var(&key),
            }
        }
    }
}

/// In-process cluster client that records create/delete calls instead of
/// talking to a real API server.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingCluster {
    pub config_maps: Mutex<Vec<ConfigMap>>,
    pub jobs: Mutex<Vec<Job>>,
    pub deleted_config_maps: Mutex<Vec<String>>,
    pub fail_job_create: AtomicBool,
    pub conflict_on_job: AtomicBool,
}

impl RecordingCluster {
    #[allow(dead_code)]
    pub fn resource_count(&self) -> usize {
        self.config_maps.lock().unwrap().len() + self.jobs.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ClusterClient for RecordingCluster {
    async fn create_config_map(
        &self,
        _namespace: &str,
        cm: &ConfigMap,
    ) -> Result<(), ClusterError> {
        self.config_maps.lock().unwrap().push(cm.clone());
        Ok(())
    }

    async fn create_job(&self, _namespace: &str, job: &Job) -> Result<(), ClusterError> {
        if self.conflict_on_job.load(Ordering::SeqCst) {
            return Err(ClusterError::AlreadyExists {
                kind: "Job",
                name: job.metadata.name.clone(),
            });
        }
        if self.fail_job_create.load(Ordering::SeqCst) {
            return Err(ClusterError::Api {
                status: 422,
                message: "job rejected".into(),
            });
        }
        self.jobs.lock().unwrap().push(job.clone());
        Ok(())
    }

    async fn delete_config_map(&self, _namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.deleted_config_maps
            .lock()
            .unwrap()
            .push(name.to_string());
        self.config_maps
            .lock()
            .unwrap()
            .retain(|cm| cm.metadata.name != name);
        Ok(())
    }
}
