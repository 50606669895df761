use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use crate::error::DirectoryError;
use crate::identity::Directory;
use crate::models::UserRecord;

/// Directory backed by a `Vec`, with an optional artificial latency.
pub struct MemoryDirectory {
    records: RwLock<Vec<UserRecord>>,
    available: AtomicBool,
    latency: Option<Duration>,
    exact_calls: AtomicUsize,
    list_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemoryDirectory {
    pub fn new(records: Vec<UserRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            available: AtomicBool::new(true),
            latency: None,
            exact_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert(&self, record: UserRecord) {
        match self.records.write() {
            Ok(mut guard) => guard.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn exact_calls(&self) -> usize {
        self.exact_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Most queries ever observed running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn round_trip(&self) -> Result<(), DirectoryError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DirectoryError("directory offline".into()))
        }
    }

    fn snapshot(&self) -> Vec<UserRecord> {
        match self.records.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Directory for MemoryDirectory {
    async fn find_by_token(&self, token: &str) -> Result<Option<UserRecord>, DirectoryError> {
        self.exact_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await?;
        Ok(self.snapshot().into_iter().find(|record| record.token == token))
    }

    async fn list_all(&self) -> Result<Vec<UserRecord>, DirectoryError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await?;
        Ok(self.snapshot())
    }
}
