//! Runs only when DATABASE_URL points at a scratch Postgres database.

mod common;

use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use campus_core::adapters::{PgDirectory, SystemClock};
use campus_core::domain::registration::{
    Registration, RegistrationCommand, RegistrationCommandHandler, RegistrationEvent,
    RegistrationStatus, StudentProfile, VerificationPolicy,
};
use campus_core::domain::student::{Student, StudentEvent};
use campus_core::handlers::StudentProvisioningHandler;
use campus_core::metrics::Metrics;
use campus_core::outbox::core::CommandContext;
use campus_core::outbox::relay::EventProcessor;
use campus_core::outbox::repository::{Repository, RepositoryConfig};
use campus_core::outbox::store::postgres::insert_messages;
use campus_core::outbox::store::{
    apply_schema, Offset, OutboxMessage, OutboxReader, PgOutbox, PgStore,
};
use campus_core::Error;

use common::{eventually, fast_relay, next_event, recorder, SequentialCodes};

async fn connect() -> Option<PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("connect to DATABASE_URL");
    apply_schema(&pool).await.expect("apply schema");
    Some(pool)
}

fn message(stream: &str) -> OutboxMessage {
    OutboxMessage {
        stream: stream.to_string(),
        event_id: Uuid::now_v7(),
        event_type: "Probe".into(),
        event_version: 1,
        aggregate_type: "Probe".into(),
        aggregate_id: Uuid::now_v7(),
        payload: "{}".into(),
        correlation_id: Uuid::now_v7(),
        causation_id: None,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_postgres_backend() {
    let Some(pool) = connect().await else {
        eprintln!("DATABASE_URL not set, skipping Postgres tests");
        return;
    };

    stream_must_be_initialized(&pool).await;
    in_flight_transactions_hide_later_commits(&pool).await;
    registration_flow_against_postgres(&pool).await;
}

async fn stream_must_be_initialized(pool: &PgPool) {
    let mut conn = pool.acquire().await.unwrap();
    let stream = format!("unknown_{}", Uuid::now_v7().simple());
    let err = insert_messages(&mut *conn, &[message(&stream)]).await.unwrap_err();
    assert!(matches!(err, Error::StreamNotInitialized { .. }));

    let outbox = PgOutbox::new(pool.clone());
    let err = outbox.register_consumer(&stream, "anyone").await.unwrap_err();
    assert!(matches!(err, Error::StreamNotInitialized { .. }));
}

async fn in_flight_transactions_hide_later_commits(pool: &PgPool) {
    let outbox = PgOutbox::new(pool.clone());
    let stream = format!("visibility_{}", Uuid::now_v7().simple());
    outbox.initialize_stream(&stream).await.unwrap();
    outbox.register_consumer(&stream, "reader").await.unwrap();

    // Older transaction stays open while a younger one commits.
    let mut slow = pool.begin().await.unwrap();
    let slow_message = message(&stream);
    insert_messages(&mut *slow, std::slice::from_ref(&slow_message)).await.unwrap();

    let mut fast = pool.begin().await.unwrap();
    let fast_message = message(&stream);
    insert_messages(&mut *fast, std::slice::from_ref(&fast_message)).await.unwrap();
    fast.commit().await.unwrap();

    let visible = outbox.fetch(&stream, Offset::default(), 10).await.unwrap();
    assert!(visible.is_empty(), "younger commit must wait for the open transaction");

    slow.commit().await.unwrap();
    let records = eventually(|| {
        let outbox = outbox.clone();
        let stream = stream.clone();
        async move {
            let records = outbox.fetch(&stream, Offset::default(), 10).await.ok()?;
            (records.len() == 2).then_some(records)
        }
    })
    .await;
    assert_eq!(records[0].message.event_id, slow_message.event_id);
    assert_eq!(records[1].message.event_id, fast_message.event_id);

    outbox.commit_offset(&stream, "reader", records[0].offset).await.unwrap();
    let remaining = outbox.fetch(&stream, records[0].offset, 10).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(
        outbox.register_consumer(&stream, "reader").await.unwrap(),
        records[0].offset
    );
}

async fn registration_flow_against_postgres(pool: &PgPool) {
    let metrics = Arc::new(Metrics::new().unwrap());
    let directory = Arc::new(PgDirectory::new(pool.clone()));
    let clock = Arc::new(SystemClock);
    let group = directory.create_group("PG-1").await.unwrap();

    let registrations = Arc::new(Repository::new(
        PgStore::<Registration>::new(pool.clone()),
        metrics.clone(),
        RepositoryConfig::default(),
    ));
    let students = Arc::new(Repository::new(
        PgStore::<Student>::new(pool.clone()),
        metrics.clone(),
        RepositoryConfig::default(),
    ));
    let commands = RegistrationCommandHandler::new(
        registrations.clone(),
        directory.clone(),
        students.clone(),
        clock.clone(),
        Arc::new(SequentialCodes::default()),
        VerificationPolicy::default(),
    );

    // Unique consumer names so reruns start from an empty offset.
    let suffix = Uuid::now_v7().simple().to_string();
    let (registration_recorder, mut registrations_seen) = recorder::<RegistrationEvent>();
    let (student_recorder, mut students_seen) = recorder::<StudentEvent>();
    let reader: Arc<dyn OutboxReader> = Arc::new(PgOutbox::new(pool.clone()));
    let mut processor = EventProcessor::new(reader, fast_relay(), metrics.clone());
    processor
        .add_handler::<RegistrationEvent, _>(
            &format!("provisioning_{suffix}"),
            StudentProvisioningHandler::new(students.clone(), clock.clone()),
        )
        .await
        .unwrap();
    processor
        .add_handler::<RegistrationEvent, _>(&format!("registration_recorder_{suffix}"), registration_recorder)
        .await
        .unwrap();
    processor
        .add_handler::<StudentEvent, _>(&format!("student_recorder_{suffix}"), student_recorder)
        .await
        .unwrap();
    let relay = processor.start(&CancellationToken::new());

    let ctx = CommandContext::new();
    let registration_id = Uuid::now_v7();
    let email = format!("pg-{suffix}@example.com");
    commands
        .handle(&ctx, RegistrationCommand::Start { registration_id, email: email.clone() })
        .await
        .unwrap();

    let err = commands
        .handle(
            &ctx,
            RegistrationCommand::Start { registration_id: Uuid::now_v7(), email: email.to_uppercase() },
        )
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    // Wait for our own Started event; earlier runs may have left others.
    loop {
        let event = next_event(&mut registrations_seen).await;
        if event.aggregate_id == registration_id {
            break;
        }
    }

    let err = commands
        .handle(&ctx, RegistrationCommand::Verify { registration_id, code: "000000".into() })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "registration.code_mismatch");
    assert_eq!(registrations.get_by_id(registration_id).await.unwrap().code_attempts, 1);

    commands
        .handle(&ctx, RegistrationCommand::Verify { registration_id, code: "000001".into() })
        .await
        .unwrap();
    commands
        .handle(
            &ctx,
            RegistrationCommand::CompleteAsStudent {
                registration_id,
                profile: StudentProfile::new("Pat", "Gres"),
                group_id: group.id,
            },
        )
        .await
        .unwrap();
    assert_eq!(
        registrations.get_by_email(&email).await.unwrap().status,
        RegistrationStatus::Completed
    );

    loop {
        let event = next_event(&mut students_seen).await;
        if event.correlation_id == ctx.correlation_id {
            break;
        }
    }
    let student = students.get_by_email(&email).await.unwrap();
    assert_eq!(student.registration_id, registration_id);
    assert_eq!(student.group_id, group.id);

    relay.shutdown().await;
}
