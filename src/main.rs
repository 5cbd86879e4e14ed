use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use appointment_desk::calendar::GoogleCalendar;
use appointment_desk::classifier::{ClassifierAgent, KeywordClassifier, LlmClassifier};
use appointment_desk::config::AppConfig;
use appointment_desk::llm::create_provider;
use appointment_desk::mailbox::ImapMailbox;
use appointment_desk::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the environment may already be populated.
    let _ = dotenvy::dotenv();

    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    // Keep the guard alive so buffered file logs are flushed on exit.
    let _log_guard = init_tracing();

    let config = AppConfig::from_env().context("invalid configuration")?;

    eprintln!("📅 Appointment Desk v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Mailbox: {} (SMTP: {})", config.mailbox.imap_host, config.mailbox.smtp_host);
    eprintln!("   Calendar: {}", config.calendar.calendar_id);
    eprintln!("   Booking URL: {}", config.calendar.booking_base_url);
    eprintln!(
        "   Poll every {}s, back off {}s",
        config.loop_config.poll_interval.as_secs(),
        config.loop_config.backoff_interval.as_secs()
    );

    let classifier: Arc<dyn ClassifierAgent> = match config.llm {
        Some(ref llm_config) => {
            eprintln!("   Classifier: LLM ({})", llm_config.model);
            Arc::new(LlmClassifier::new(create_provider(llm_config)?))
        }
        None => {
            eprintln!("   Classifier: keyword rules");
            Arc::new(KeywordClassifier::new())
        }
    };

    let orchestrator = Orchestrator::new(
        Arc::new(ImapMailbox::new(config.mailbox.clone())),
        Arc::new(GoogleCalendar::new(config.calendar.clone())),
        classifier,
        config.loop_config.clone(),
    );

    tokio::select! {
        () = orchestrator.run_forever() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for shutdown signal")?;
            tracing::info!("Stopping appointment desk");
        }
    }

    Ok(())
}

/// Stderr logging, plus a daily-rolling file under `LOG_DIR` when set.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match std::env::var("LOG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "appointment-desk.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        _ => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}
