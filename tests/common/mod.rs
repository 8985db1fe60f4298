#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;
use tokio::sync::mpsc;

use campus_core::adapters::{InMemoryDirectory, LogMailSender};
use campus_core::domain::registration::{
    Registration, RegistrationCommandHandler, VerificationPolicy,
};
use campus_core::domain::student::Student;
use campus_core::metrics::Metrics;
use campus_core::outbox::core::{DomainEvent, EventEnvelope};
use campus_core::outbox::relay::{handler_fn, EventHandler, RelayConfig};
use campus_core::outbox::repository::{Repository, RepositoryConfig};
use campus_core::outbox::store::{InMemoryDatabase, MemoryStore};
use campus_core::ports::{Clock, CodeGenerator};
use campus_core::utils::RetryConfig;

pub type RegistrationRepo = Repository<Registration, MemoryStore<Registration>>;
pub type StudentRepo = Repository<Student, MemoryStore<Student>>;

pub fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self { now: Mutex::new(now) })
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Hands out 000001, 000002, ...
#[derive(Default)]
pub struct SequentialCodes {
    next: AtomicU32,
}

impl CodeGenerator for SequentialCodes {
    fn generate(&self, length: usize) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{n:0length$}")
    }
}

pub fn fast_relay() -> RelayConfig {
    RelayConfig {
        poll_interval: StdDuration::from_millis(10),
        batch_size: 10,
        retry: RetryConfig::fast(),
    }
}

/// Everything a registration scenario needs, backed by one in-memory db.
pub struct Env {
    pub db: Arc<InMemoryDatabase>,
    pub metrics: Arc<Metrics>,
    pub clock: Arc<ManualClock>,
    pub codes: Arc<SequentialCodes>,
    pub directory: Arc<InMemoryDirectory>,
    pub mailer: Arc<LogMailSender>,
    pub registrations: Arc<RegistrationRepo>,
    pub students: Arc<StudentRepo>,
    pub commands: RegistrationCommandHandler<MemoryStore<Registration>>,
}

impl Env {
    pub fn new() -> Self {
        Self::with_policy(VerificationPolicy::default())
    }

    pub fn with_policy(policy: VerificationPolicy) -> Self {
        let db = InMemoryDatabase::new();
        let metrics = Arc::new(Metrics::new().unwrap());
        let clock = ManualClock::at(t0());
        let codes = Arc::new(SequentialCodes::default());
        let directory = Arc::new(InMemoryDirectory::new());
        let mailer = Arc::new(LogMailSender::new());

        let registrations = Arc::new(Repository::new(
            MemoryStore::new(db.clone()),
            metrics.clone(),
            RepositoryConfig::default(),
        ));
        let students = Arc::new(Repository::new(
            MemoryStore::new(db.clone()),
            metrics.clone(),
            RepositoryConfig::default(),
        ));
        let commands = RegistrationCommandHandler::new(
            registrations.clone(),
            directory.clone(),
            students.clone(),
            clock.clone(),
            codes.clone(),
            policy,
        );

        Self {
            db,
            metrics,
            clock,
            codes,
            directory,
            mailer,
            registrations,
            students,
            commands,
        }
    }
}

/// Handler forwarding every envelope into a channel.
pub fn recorder<E: DomainEvent>() -> (impl EventHandler<E>, mpsc::UnboundedReceiver<EventEnvelope<E>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = handler_fn(move |event: EventEnvelope<E>| {
        let tx = tx.clone();
        async move {
            tx.send(event)
                .map_err(|_| anyhow::anyhow!("recorder receiver dropped"))?;
            Ok::<(), anyhow::Error>(())
        }
    });
    (handler, rx)
}

pub async fn next_event<E>(rx: &mut mpsc::UnboundedReceiver<EventEnvelope<E>>) -> EventEnvelope<E> {
    tokio::time::timeout(StdDuration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("recorder channel closed")
}

/// Poll `check` until it returns `Some` or five seconds pass.
pub async fn eventually<T, F, Fut>(mut check: F) -> T
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + StdDuration::from_secs(5);
    loop {
        if let Some(value) = check().await {
            return value;
        }
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
}
