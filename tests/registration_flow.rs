mod common;

use chrono::Duration;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use campus_core::domain::registration::{
    RegistrationCommand, RegistrationEvent, RegistrationStatus, StudentProfile,
};
use campus_core::domain::student::{Student, StudentEvent};
use campus_core::handlers::{StudentProvisioningHandler, VerificationMailHandler, WelcomeMailHandler};
use campus_core::outbox::core::{CommandContext, DomainEvent};
use campus_core::outbox::relay::EventProcessor;
use campus_core::outbox::store::OutboxReader;

use common::{eventually, fast_relay, next_event, recorder, t0, Env};

#[tokio::test]
async fn test_registration_to_student_end_to_end() {
    let env = Env::new();
    let group = env.directory.add_group("CS-101").await;

    let (registration_recorder, mut registrations_seen) = recorder::<RegistrationEvent>();
    let (student_recorder, mut students_seen) = recorder::<StudentEvent>();

    let reader: Arc<dyn OutboxReader> = env.db.clone();
    let mut processor = EventProcessor::new(reader, fast_relay(), env.metrics.clone());
    processor
        .add_handler::<RegistrationEvent, _>(
            "verification_mail",
            VerificationMailHandler::new(env.registrations.clone(), env.mailer.clone(), env.clock.clone()),
        )
        .await
        .unwrap();
    processor
        .add_handler::<RegistrationEvent, _>(
            "student_provisioning",
            StudentProvisioningHandler::new(env.students.clone(), env.clock.clone()),
        )
        .await
        .unwrap();
    processor
        .add_handler::<RegistrationEvent, _>("registration_recorder", registration_recorder)
        .await
        .unwrap();
    processor
        .add_handler::<StudentEvent, _>(
            "welcome_mail",
            WelcomeMailHandler::new(env.directory.clone(), env.mailer.clone()),
        )
        .await
        .unwrap();
    processor
        .add_handler::<StudentEvent, _>("student_recorder", student_recorder)
        .await
        .unwrap();

    let token = CancellationToken::new();
    let relay = processor.start(&token);
    let ctx = CommandContext::new();
    let registration_id = Uuid::now_v7();

    // Start: the first code goes out by mail.
    env.commands
        .handle(
            &ctx,
            RegistrationCommand::Start {
                registration_id,
                email: "Alice@Example.com".into(),
            },
        )
        .await
        .unwrap();

    let started = next_event(&mut registrations_seen).await;
    assert_eq!(started.aggregate_id, registration_id);
    assert_eq!(started.correlation_id, ctx.correlation_id);
    let first_code = match &started.event_data {
        RegistrationEvent::Started { email, verification_code, .. } => {
            assert_eq!(email, "alice@example.com");
            verification_code.clone()
        }
        other => panic!("unexpected event {other:?}"),
    };
    assert_eq!(first_code, "000001");

    let registrations = env.registrations.clone();
    eventually(|| {
        let registrations = registrations.clone();
        async move {
            let current = registrations.get_by_id(registration_id).await.ok()?;
            (current.status == RegistrationStatus::CodeSent).then_some(())
        }
    })
    .await;

    // Resend inside the cooldown is refused and publishes nothing.
    let err = env
        .commands
        .handle(&ctx, RegistrationCommand::ResendCode { registration_id })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "registration.cooldown_active");
    assert_eq!(env.db.records("registration").await.len(), 1);

    // After the cooldown a fresh code is issued.
    env.clock.advance(Duration::seconds(61));
    env.commands
        .handle(&ctx, RegistrationCommand::ResendCode { registration_id })
        .await
        .unwrap();

    let resent = next_event(&mut registrations_seen).await;
    let second_code = match &resent.event_data {
        RegistrationEvent::CodeResent { verification_code, .. } => verification_code.clone(),
        other => panic!("unexpected event {other:?}"),
    };
    assert_ne!(second_code, first_code);

    // The stale code no longer matches.
    let err = env
        .commands
        .handle(
            &ctx,
            RegistrationCommand::Verify { registration_id, code: first_code },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "registration.code_mismatch");

    env.commands
        .handle(
            &ctx,
            RegistrationCommand::Verify { registration_id, code: second_code },
        )
        .await
        .unwrap();
    let verified = env.registrations.get_by_id(registration_id).await.unwrap();
    assert_eq!(verified.status, RegistrationStatus::Verified);

    env.commands
        .handle(
            &ctx,
            RegistrationCommand::CompleteAsStudent {
                registration_id,
                profile: StudentProfile::new(" Alice ", "Liddell"),
                group_id: group.id,
            },
        )
        .await
        .unwrap();

    let completed = next_event(&mut registrations_seen).await;
    assert!(matches!(
        completed.event_data,
        RegistrationEvent::StudentCompleted { ref first_name, .. } if first_name == "Alice"
    ));

    // The provisioning handler turns the completion into a student.
    let created = next_event(&mut students_seen).await;
    assert_eq!(created.correlation_id, ctx.correlation_id);
    assert_eq!(created.causation_id, Some(completed.event_id));

    let student = env.students.get_by_email("alice@example.com").await.unwrap();
    assert_eq!(student.group_id, group.id);
    assert_eq!(student.registration_id, registration_id);
    assert_eq!(student.full_name(), "Alice Liddell");

    let completed_registration = env.registrations.get_by_id(registration_id).await.unwrap();
    assert_eq!(completed_registration.status, RegistrationStatus::Completed);

    // Two verification mails, then the welcome mail.
    let mailer = env.mailer.clone();
    let mails = eventually(|| {
        let mailer = mailer.clone();
        async move {
            let mails = mailer.sent_to("alice@example.com").await;
            (mails.len() >= 3).then_some(mails)
        }
    })
    .await;
    assert_eq!(mails.len(), 3);
    assert!(mails.iter().any(|m| m.message.contains("CS-101")));

    relay.shutdown().await;
}

#[tokio::test]
async fn test_email_is_free_again_after_completion_only() {
    let env = Env::new();
    let group = env.directory.add_group("CS-102").await;
    let (registration_recorder, _seen) = recorder::<RegistrationEvent>();

    let reader: Arc<dyn OutboxReader> = env.db.clone();
    let mut processor = EventProcessor::new(reader, fast_relay(), env.metrics.clone());
    processor
        .add_handler::<RegistrationEvent, _>("registration_recorder", registration_recorder)
        .await
        .unwrap();

    let ctx = CommandContext::new();
    let first = Uuid::now_v7();
    env.commands
        .handle(&ctx, RegistrationCommand::Start { registration_id: first, email: "bob@example.com".into() })
        .await
        .unwrap();

    let err = env
        .commands
        .handle(
            &ctx,
            RegistrationCommand::Start { registration_id: Uuid::now_v7(), email: "BOB@example.com".into() },
        )
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    env.commands
        .handle(&ctx, RegistrationCommand::Verify { registration_id: first, code: "000001".into() })
        .await
        .unwrap();
    env.commands
        .handle(
            &ctx,
            RegistrationCommand::CompleteAsStudent {
                registration_id: first,
                profile: StudentProfile::new("Bob", "Builder"),
                group_id: group.id,
            },
        )
        .await
        .unwrap();

    env.clock.advance(Duration::minutes(5));
    let second = Uuid::now_v7();
    env.commands
        .handle(&ctx, RegistrationCommand::Start { registration_id: second, email: "bob@example.com".into() })
        .await
        .unwrap();

    let newest = env.registrations.get_by_email("bob@example.com").await.unwrap();
    assert_eq!(newest.id, second);
}

#[tokio::test]
async fn test_email_owned_by_a_student_cannot_register_again() {
    let env = Env::new();
    let group = env.directory.add_group("CS-103").await;
    env.db.initialize_stream(StudentEvent::STREAM).await.unwrap();
    env.db.initialize_stream(RegistrationEvent::STREAM).await.unwrap();

    let ctx = CommandContext::new();
    let pending = Uuid::now_v7();
    env.commands
        .handle(&ctx, RegistrationCommand::Start { registration_id: pending, email: "dora@example.com".into() })
        .await
        .unwrap();
    env.commands
        .handle(&ctx, RegistrationCommand::Verify { registration_id: pending, code: "000001".into() })
        .await
        .unwrap();

    // Another registration's student claims the email first.
    let owner = Uuid::now_v7();
    let mut student =
        Student::create(Uuid::now_v7(), "dora@example.com", "Dora", "Explorer", group.id, owner, t0()).unwrap();
    env.students.save(&ctx, &mut student).await.unwrap();

    let err = env
        .commands
        .handle(
            &ctx,
            RegistrationCommand::CompleteAsStudent {
                registration_id: pending,
                profile: StudentProfile::new("Dora", "Explorer"),
                group_id: group.id,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "registration.email_taken");
    let unchanged = env.registrations.get_by_id(pending).await.unwrap();
    assert_eq!(unchanged.status, RegistrationStatus::Verified);

    let err = env
        .commands
        .handle(
            &ctx,
            RegistrationCommand::Start { registration_id: Uuid::now_v7(), email: "DORA@example.com".into() },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "registration.email_taken");
}
