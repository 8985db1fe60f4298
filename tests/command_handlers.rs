mod common;

use chrono::Duration;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use campus_core::adapters::InMemoryDirectory;
use campus_core::config::AppConfig;
use campus_core::domain::registration::{
    RegistrationCommand, RegistrationEvent, RegistrationStatus, StudentProfile,
};
use campus_core::domain::staff_invitation::{
    StaffInvitation, StaffInvitationCommand, StaffInvitationCommandHandler, StaffInvitationEvent,
};
use campus_core::domain::student::{Student, StudentCommandHandler, StudentEvent};
use campus_core::handlers::{InvitationMailHandler, InvitationReceiptHandler};
use campus_core::outbox::core::{CommandContext, DomainEvent, Outcome};
use campus_core::outbox::relay::{EventGroupProcessor, EventHandler};
use campus_core::outbox::repository::{Repository, RepositoryConfig};
use campus_core::outbox::store::{MemoryStore, OutboxReader};
use campus_core::ports::StudentSaver;
use campus_core::Error;

use common::{eventually, fast_relay, t0, Env, ManualClock, SequentialCodes};

async fn started(env: &Env) -> Uuid {
    env.db.initialize_stream(RegistrationEvent::STREAM).await.unwrap();
    let registration_id = Uuid::now_v7();
    env.commands
        .handle(
            &CommandContext::new(),
            RegistrationCommand::Start {
                registration_id,
                email: format!("{registration_id}@example.com"),
            },
        )
        .await
        .unwrap();
    registration_id
}

async fn verify(env: &Env, registration_id: Uuid, code: &str) -> Result<Uuid, Error> {
    env.commands
        .handle(
            &CommandContext::new(),
            RegistrationCommand::Verify { registration_id, code: code.into() },
        )
        .await
}

#[tokio::test]
async fn test_wrong_codes_are_counted_until_lockout() {
    let env = Env::new();
    let id = started(&env).await;

    for expected_attempts in 1..=3 {
        let err = verify(&env, id, "999999").await.unwrap_err();
        assert_eq!(err.code(), "registration.code_mismatch");
        let stored = env.registrations.get_by_id(id).await.unwrap();
        assert_eq!(stored.code_attempts, expected_attempts);
    }

    let err = verify(&env, id, "999999").await.unwrap_err();
    assert_eq!(err.code(), "registration.attempts_exceeded");
    assert_eq!(env.registrations.get_by_id(id).await.unwrap().code_attempts, 4);

    // Locked out: even the right code is refused and nothing is written.
    let version = env.registrations.get_by_id(id).await.unwrap().version;
    let err = verify(&env, id, "000001").await.unwrap_err();
    assert_eq!(err.code(), "registration.attempts_exceeded");
    let stored = env.registrations.get_by_id(id).await.unwrap();
    assert_eq!(stored.code_attempts, 4);
    assert_eq!(stored.version, version);
}

#[tokio::test]
async fn test_configured_attempt_limit_reaches_the_command_handler() {
    let config = AppConfig::from_lookup(|key| match key {
        "DATABASE_URL" => Some("postgres://db/campus".to_string()),
        "VERIFICATION_MAX_ATTEMPTS" => Some("1".to_string()),
        _ => None,
    })
    .unwrap();
    let env = Env::with_policy(config.verification);
    let id = started(&env).await;

    let err = verify(&env, id, "999999").await.unwrap_err();
    assert_eq!(err.code(), "registration.code_mismatch");
    // The default limit would still allow a second wrong code.
    let err = verify(&env, id, "999999").await.unwrap_err();
    assert_eq!(err.code(), "registration.attempts_exceeded");
    let err = verify(&env, id, "000001").await.unwrap_err();
    assert_eq!(err.code(), "registration.attempts_exceeded");
}

#[tokio::test]
async fn test_resend_after_cooldown_lifts_lockout() {
    let env = Env::new();
    let id = started(&env).await;
    for _ in 0..4 {
        let _ = verify(&env, id, "999999").await;
    }

    env.clock.advance(Duration::seconds(60));
    env.commands
        .handle(&CommandContext::new(), RegistrationCommand::ResendCode { registration_id: id })
        .await
        .unwrap();

    let stored = env.registrations.get_by_id(id).await.unwrap();
    assert_eq!(stored.code_attempts, 0);
    assert_eq!(stored.verification_code, "000002");
    verify(&env, id, "000002").await.unwrap();
}

#[tokio::test]
async fn test_code_is_valid_up_to_its_expiry_instant() {
    let env = Env::new();
    let on_time = started(&env).await;
    let late = started(&env).await;
    let expires_at = env.registrations.get_by_id(on_time).await.unwrap().code_expires_at;

    env.clock.set(expires_at);
    verify(&env, on_time, "000001").await.unwrap();

    env.clock.set(expires_at + Duration::milliseconds(1));
    let err = verify(&env, late, "000002").await.unwrap_err();
    assert_eq!(err.code(), "registration.code_expired");

    let stored = env.registrations.get_by_id(late).await.unwrap();
    assert_eq!(stored.code_attempts, 0);
    assert_eq!(stored.status, RegistrationStatus::Started);
}

#[tokio::test]
async fn test_failed_commit_leaves_row_and_outbox_untouched() {
    let env = Env::new();
    let id = started(&env).await;
    env.clock.advance(Duration::minutes(2));

    env.db.fail_next_commit();
    let err = env
        .commands
        .handle(&CommandContext::new(), RegistrationCommand::ResendCode { registration_id: id })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Internal(_)));

    let stored = env.registrations.get_by_id(id).await.unwrap();
    assert_eq!(stored.verification_code, "000001");
    assert_eq!(stored.version, 1);
    assert_eq!(env.db.records(RegistrationEvent::STREAM).await.len(), 1);

    // The row lock was released with the failed transaction.
    env.commands
        .handle(&CommandContext::new(), RegistrationCommand::ResendCode { registration_id: id })
        .await
        .unwrap();
    assert_eq!(env.db.records(RegistrationEvent::STREAM).await.len(), 2);
}

#[tokio::test]
async fn test_completion_with_unknown_group_rolls_back() {
    let env = Env::new();
    let id = started(&env).await;
    verify(&env, id, "000001").await.unwrap();

    let err = env
        .commands
        .handle(
            &CommandContext::new(),
            RegistrationCommand::CompleteAsStudent {
                registration_id: id,
                profile: StudentProfile::new("Dana", "Scully"),
                group_id: Uuid::now_v7(),
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let stored = env.registrations.get_by_id(id).await.unwrap();
    assert_eq!(stored.status, RegistrationStatus::Verified);
    assert_eq!(env.db.records(RegistrationEvent::STREAM).await.len(), 1);
}

#[tokio::test]
async fn test_incomplete_profile_is_rejected() {
    let env = Env::new();
    let group = env.directory.add_group("BIO-1").await;
    let id = started(&env).await;
    verify(&env, id, "000001").await.unwrap();

    let err = env
        .commands
        .handle(
            &CommandContext::new(),
            RegistrationCommand::CompleteAsStudent {
                registration_id: id,
                profile: StudentProfile::new("  ", "Mulder"),
                group_id: group.id,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "registration.incomplete_profile");
}

#[tokio::test]
async fn test_unknown_registration_is_not_found() {
    let env = Env::new();
    let err = verify(&env, Uuid::now_v7(), "000001").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_concurrent_attempts_are_serialized_by_the_row_lock() {
    let env = Env::new();
    let id = started(&env).await;

    let results = join_all((0..3).map(|_| verify(&env, id, "999999"))).await;
    assert!(results.iter().all(|r| r
        .as_ref()
        .is_err_and(|e| e.code() == "registration.code_mismatch")));

    let stored = env.registrations.get_by_id(id).await.unwrap();
    assert_eq!(stored.code_attempts, 3);
    assert_eq!(stored.version, 4);
}

#[tokio::test]
async fn test_deadline_bounds_waiting_for_a_locked_row() {
    let env = Env::new();
    let id = started(&env).await;

    let holder_ctx = CommandContext::new();
    let holder = env.registrations.update(&holder_ctx, id, |registration| {
        Box::pin(async move {
            tokio::time::sleep(StdDuration::from_millis(200)).await;
            registration.mark_code_sent(t0());
            Outcome::Commit
        })
    });
    let impatient_ctx = CommandContext::new().with_timeout(StdDuration::from_millis(20));
    let waiter = env.registrations.update_with(&impatient_ctx, id, |registration| {
        registration.mark_code_sent(t0());
        Outcome::Commit
    });

    let (held, waited) = tokio::join!(holder, waiter);
    held.unwrap();
    let err = waited.unwrap_err();
    assert!(matches!(err, Error::Internal(_)));
    assert!(err.to_string().contains("deadline exceeded"));

    let stored = env.registrations.get_by_id(id).await.unwrap();
    assert_eq!(stored.status, RegistrationStatus::CodeSent);
    assert_eq!(stored.version, 2);
}

// ============================================================================
// Staff invitations
// ============================================================================

struct InvitationEnv {
    env: Env,
    directory: Arc<InMemoryDirectory>,
    repository: Arc<Repository<StaffInvitation, MemoryStore<StaffInvitation>>>,
    commands: StaffInvitationCommandHandler<MemoryStore<StaffInvitation>>,
}

async fn invitation_env() -> InvitationEnv {
    let env = Env::new();
    env.db.initialize_stream(StaffInvitationEvent::STREAM).await.unwrap();
    let repository = Arc::new(Repository::new(
        MemoryStore::new(env.db.clone()),
        env.metrics.clone(),
        RepositoryConfig::default(),
    ));
    let clock: Arc<ManualClock> = env.clock.clone();
    let codes: Arc<SequentialCodes> = env.codes.clone();
    let commands = StaffInvitationCommandHandler::new(
        repository.clone(),
        env.directory.clone(),
        clock,
        codes,
    );
    InvitationEnv {
        directory: env.directory.clone(),
        env,
        repository,
        commands,
    }
}

#[tokio::test]
async fn test_staff_member_creates_and_extends_invitation() {
    let ctx = invitation_env().await;
    let creator = ctx.directory.add_user("head@campus.edu", "staff").await;
    let invitation_id = Uuid::now_v7();

    ctx.commands
        .handle(
            &CommandContext::new(),
            StaffInvitationCommand::Create {
                invitation_id,
                creator_id: creator.id,
                recipients: vec!["New@Campus.edu".into(), "new@campus.edu".into()],
                valid_until: None,
            },
        )
        .await
        .unwrap();

    let invitation = ctx.repository.get_by_id(invitation_id).await.unwrap();
    assert_eq!(invitation.recipients, vec!["new@campus.edu".to_string()]);
    assert_eq!(invitation.valid_until, t0() + Duration::days(7));
    assert_eq!(invitation.code.len(), 10);

    let by_code = ctx.repository.get_by_code(&invitation.code).await.unwrap();
    assert_eq!(by_code.id, invitation_id);

    ctx.commands
        .handle(
            &CommandContext::new(),
            StaffInvitationCommand::AddRecipients {
                invitation_id,
                recipients: vec!["new@campus.edu".into(), "other@campus.edu".into()],
            },
        )
        .await
        .unwrap();

    let records = ctx.env.db.records(StaffInvitationEvent::STREAM).await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].message.event_type, "StaffInvitationRecipientsAdded");
    assert!(records[1].message.payload.contains("other@campus.edu"));
    assert!(!records[1].message.payload.contains("\"new@campus.edu\""));
}

#[tokio::test]
async fn test_only_staff_may_invite() {
    let ctx = invitation_env().await;
    let student = ctx.directory.add_user("kid@campus.edu", "student").await;

    let err = ctx
        .commands
        .handle(
            &CommandContext::new(),
            StaffInvitationCommand::Create {
                invitation_id: Uuid::now_v7(),
                creator_id: student.id,
                recipients: vec!["friend@campus.edu".into()],
                valid_until: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "staff_invitation.creator_not_staff");
    assert!(ctx.env.db.records(StaffInvitationEvent::STREAM).await.is_empty());
}

#[tokio::test]
async fn test_deleted_invitation_cannot_be_redeemed() {
    let ctx = invitation_env().await;
    let creator = ctx.directory.add_user("admin@campus.edu", "admin").await;
    let invitation_id = Uuid::now_v7();

    ctx.commands
        .handle(
            &CommandContext::new(),
            StaffInvitationCommand::Create {
                invitation_id,
                creator_id: creator.id,
                recipients: vec!["temp@campus.edu".into()],
                valid_until: None,
            },
        )
        .await
        .unwrap();
    let code = ctx.repository.get_by_id(invitation_id).await.unwrap().code;

    ctx.commands
        .handle(&CommandContext::new(), StaffInvitationCommand::Delete { invitation_id })
        .await
        .unwrap();

    assert!(ctx.repository.get_by_code(&code).await.unwrap_err().is_not_found());
    let err = ctx
        .commands
        .handle(
            &CommandContext::new(),
            StaffInvitationCommand::AddRecipients {
                invitation_id,
                recipients: vec!["late@campus.edu".into()],
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "staff_invitation.deleted");
}

// ============================================================================
// Students
// ============================================================================

#[tokio::test]
async fn test_student_moves_only_to_existing_groups() {
    let env = Env::new();
    env.db.initialize_stream(StudentEvent::STREAM).await.unwrap();
    let first_group = env.directory.add_group("MATH-1").await;
    let second_group = env.directory.add_group("MATH-2").await;

    let student = Student::create(
        Uuid::now_v7(),
        "erin@example.com",
        "Erin",
        "Gilbert",
        first_group.id,
        Uuid::now_v7(),
        t0(),
    )
    .unwrap();
    let student_id = student.id;
    env.students.save_student(&CommandContext::new(), student).await.unwrap();

    let commands = StudentCommandHandler::new(
        env.students.clone(),
        env.directory.clone(),
        env.clock.clone(),
    );

    let err = commands
        .change_group(&CommandContext::new(), student_id, Uuid::now_v7())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(env.students.get_by_id(student_id).await.unwrap().group_id, first_group.id);

    commands
        .change_group(&CommandContext::new(), student_id, second_group.id)
        .await
        .unwrap();
    assert_eq!(env.students.get_by_id(student_id).await.unwrap().group_id, second_group.id);

    let records = env.db.records(StudentEvent::STREAM).await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].message.event_type, "StudentGroupChanged");
}

#[tokio::test]
async fn test_invitation_mails_reach_recipients_and_creator() {
    let ctx = invitation_env().await;
    let creator = ctx.directory.add_user("dean@campus.edu", "staff").await;

    let reader: Arc<dyn OutboxReader> = ctx.env.db.clone();
    let mut processor = EventGroupProcessor::new(reader, fast_relay(), ctx.env.metrics.clone());
    let handlers: Vec<Arc<dyn EventHandler<StaffInvitationEvent>>> = vec![
        Arc::new(InvitationMailHandler::new(ctx.env.mailer.clone())),
        Arc::new(InvitationReceiptHandler::new(ctx.directory.clone(), ctx.env.mailer.clone())),
    ];
    processor
        .add_handlers_group("staff_invitation_mail", handlers)
        .await
        .unwrap();
    let relay = processor.start(&CancellationToken::new());

    ctx.commands
        .handle(
            &CommandContext::new(),
            StaffInvitationCommand::Create {
                invitation_id: Uuid::now_v7(),
                creator_id: creator.id,
                recipients: vec!["one@campus.edu".into(), "two@campus.edu".into()],
                valid_until: None,
            },
        )
        .await
        .unwrap();

    let mailer = ctx.env.mailer.clone();
    let sent = eventually(|| {
        let mailer = mailer.clone();
        async move {
            let sent = mailer.sent().await;
            (sent.len() >= 3).then_some(sent)
        }
    })
    .await;
    relay.shutdown().await;

    assert_eq!(sent.len(), 3);
    let code = ctx.repository.get_by_id(sent_invitation_id(&ctx).await).await.unwrap().code;
    for recipient in ["one@campus.edu", "two@campus.edu"] {
        let mail = sent.iter().find(|m| m.to_email == recipient).unwrap();
        assert!(mail.message.contains(code.as_str()));
    }
    let receipt = sent.iter().find(|m| m.to_email == "dean@campus.edu").unwrap();
    assert!(receipt.message.contains("one@campus.edu, two@campus.edu"));
}

async fn sent_invitation_id(ctx: &InvitationEnv) -> Uuid {
    ctx.env.db.records(StaffInvitationEvent::STREAM).await[0].message.aggregate_id
}
