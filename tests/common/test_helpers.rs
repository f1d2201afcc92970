#![allow(dead_code)]

use gatekeeper::{AdmissionConfig, AdmissionEngine, Clock, InMemoryRecordStore, ManualClock};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;

/// Engine wired to a manual clock and an in-memory store, both returned for driving.
pub struct Harness {
    pub engine: Arc<AdmissionEngine>,
    pub clock: ManualClock,
    pub store: InMemoryRecordStore,
}

impl Harness {
    pub fn now(&self) -> u64 {
        self.clock.now_millis()
    }
}

pub async fn harness(config: AdmissionConfig) -> Harness {
    harness_with_store(config, InMemoryRecordStore::new()).await
}

pub async fn harness_with_store(config: AdmissionConfig, store: InMemoryRecordStore) -> Harness {
    let clock = ManualClock::at(1_700_000_000_000);
    let engine = AdmissionEngine::builder(config)
        .store(store.clone())
        .clock(clock.clone())
        .build()
        .await
        .expect("valid config");
    Harness { engine: Arc::new(engine), clock, store }
}

/// Address ceiling 1, token `abc123` ceiling 2, three second blocks.
pub fn reference_config() -> AdmissionConfig {
    AdmissionConfig::new(Duration::from_secs(3), 1).with_token("abc123", 2)
}

#[derive(Clone)]
pub struct SharedWriter(Arc<Mutex<Vec<u8>>>);

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedGuard;
    fn make_writer(&'a self) -> Self::Writer {
        SharedGuard(self.0.clone())
    }
}

pub struct SharedGuard(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for SharedGuard {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Install a thread-local subscriber that records formatted output into the returned buffer.
pub fn capture_logs() -> (Arc<Mutex<Vec<u8>>>, tracing::subscriber::DefaultGuard) {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::fmt()
        .with_writer(BoxMakeWriter::new(SharedWriter(buffer.clone())))
        .with_target(true)
        .with_ansi(false)
        .without_time()
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (buffer, guard)
}

pub fn logged(buffer: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8(buffer.lock().unwrap().clone()).unwrap()
}
