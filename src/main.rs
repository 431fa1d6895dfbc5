use std::net::SocketAddr;

use anyhow::Context;
use email_triage::Service;
use email_triage::config::ServiceConfig;
use email_triage::jobs::spawn_eviction_task;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env().context("Failed to load configuration")?;

    // The guard must outlive the subscriber so buffered lines get flushed.
    let (file_layer, _log_guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "email-triage.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    let service = Service::build(&config);

    eprintln!("📧 Email Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://{}", config.bind_addr);
    eprintln!(
        "   Classifier tiers: {}",
        remote_tiers(
            config.remote_classifier.is_some(),
            "remote → statistical → heuristic",
            "statistical → heuristic"
        )
    );
    eprintln!(
        "   Responder tiers: {}",
        remote_tiers(config.remote_generator.is_some(), "remote → template", "template")
    );
    eprintln!("   Model artifact: {}", config.model_path.display());
    match &config.allowed_origin {
        Some(origin) => eprintln!("   CORS origin: {origin}"),
        None => eprintln!("   CORS: disabled"),
    }
    if let Some(dir) = &config.log_dir {
        eprintln!("   Logs: {}", dir.display());
    }
    eprintln!();

    // Train or load the statistical model before the first job needs it.
    let statistical = service.statistical.clone();
    tokio::spawn(async move {
        if let Err(e) = statistical.model().await {
            warn!(error = %e, "Statistical classifier unavailable, heuristic fallback will be used");
        }
    });

    spawn_eviction_task(service.store.clone(), config.job_ttl, config.sweep_interval);
    info!(
        ttl_secs = config.job_ttl.as_secs(),
        sweep_secs = config.sweep_interval.as_secs(),
        "Job eviction enabled"
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "Listening");

    axum::serve(
        listener,
        service
            .router()
            .into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

fn remote_tiers(remote: bool, with: &'static str, without: &'static str) -> &'static str {
    if remote { with } else { without }
}
