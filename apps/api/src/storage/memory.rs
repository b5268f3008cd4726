use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::storage::ObjectStore;

/// In-process object store used by tests.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, (Bytes, String)>>,
    fail_deletes: AtomicBool,
    fail_puts: AtomicBool,
    /// Puts still allowed before every further put fails.
    put_budget: Mutex<Option<usize>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_puts_after(&self, successes: usize) {
        *self.put_budget.lock().unwrap() = Some(successes);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            anyhow::bail!("simulated put failure for {key}");
        }
        if let Some(left) = self.put_budget.lock().unwrap().as_mut() {
            if *left == 0 {
                anyhow::bail!("simulated put failure for {key}");
            }
            *left -= 1;
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (body, content_type.to_string()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            anyhow::bail!("simulated delete failure for {key}");
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("memory://bucket/{key}")
    }
}
