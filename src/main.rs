use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use campus_core::adapters::{LogMailSender, PgDirectory, SystemClock};
use campus_core::config::AppConfig;
use campus_core::domain::registration::{Registration, RegistrationEvent};
use campus_core::domain::staff_invitation::StaffInvitationEvent;
use campus_core::domain::student::{Student, StudentEvent};
use campus_core::handlers::{
    InvitationMailHandler, InvitationReceiptHandler, StudentProvisioningHandler,
    VerificationMailHandler, WelcomeMailHandler,
};
use campus_core::metrics::Metrics;
use campus_core::outbox::relay::{EventGroupProcessor, EventHandler, EventProcessor};
use campus_core::outbox::repository::Repository;
use campus_core::outbox::store::{apply_schema, OutboxReader, PgOutbox, PgStore};
use campus_core::ports::Clock;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,campus_core=debug")),
        )
        .init();

    let config = AppConfig::from_env()?;
    // This process only relays events. `config.verification` is for the
    // service that builds a `RegistrationCommandHandler`.
    tracing::info!(
        poll_interval_ms = config.relay.poll_interval.as_millis() as u64,
        batch_size = config.relay.batch_size,
        code_ttl_secs = config.verification.code_ttl.num_seconds(),
        max_code_attempts = config.verification.max_code_attempts,
        "Configuration loaded"
    );

    // === 1. Database ===
    tracing::info!("Connecting to Postgres...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    apply_schema(&pool).await?;

    // === 2. Shared collaborators ===
    let metrics = Arc::new(Metrics::new()?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mailer = Arc::new(LogMailSender::new());
    let directory = Arc::new(PgDirectory::new(pool.clone()));
    let reader: Arc<dyn OutboxReader> = Arc::new(PgOutbox::new(pool.clone()));

    let registrations = Arc::new(Repository::new(
        PgStore::<Registration>::new(pool.clone()),
        metrics.clone(),
        config.repository.clone(),
    ));
    let students = Arc::new(Repository::new(
        PgStore::<Student>::new(pool.clone()),
        metrics.clone(),
        config.repository.clone(),
    ));

    // === 3. Relay consumers ===
    let mut processor = EventProcessor::new(reader.clone(), config.relay.clone(), metrics.clone());
    processor
        .add_handler::<RegistrationEvent, _>(
            "verification_mail",
            VerificationMailHandler::new(registrations.clone(), mailer.clone(), clock.clone()),
        )
        .await?;
    processor
        .add_handler::<RegistrationEvent, _>(
            "student_provisioning",
            StudentProvisioningHandler::new(students.clone(), clock.clone()),
        )
        .await?;
    processor
        .add_handler::<StudentEvent, _>(
            "welcome_mail",
            WelcomeMailHandler::new(directory.clone(), mailer.clone()),
        )
        .await?;

    let mut groups = EventGroupProcessor::new(reader, config.relay.clone(), metrics.clone());
    let invitation_handlers: Vec<Arc<dyn EventHandler<StaffInvitationEvent>>> = vec![
        Arc::new(InvitationMailHandler::new(mailer.clone())),
        Arc::new(InvitationReceiptHandler::new(directory.clone(), mailer.clone())),
    ];
    groups
        .add_handlers_group("staff_invitation_mail", invitation_handlers)
        .await?;

    // === 4. Run until Ctrl-C ===
    let token = CancellationToken::new();
    let relay = processor.start(&token);
    let group_relay = groups.start(&token);
    tracing::info!("Relay running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    token.cancel();
    relay.join().await;
    group_relay.join().await;

    tracing::info!(
        metric_families = metrics.registry().gather().len(),
        "Stopped"
    );
    Ok(())
}
