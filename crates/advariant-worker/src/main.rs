//! Variant render worker binary.
//!
//! One invocation handles one trigger file, named by the `TRIGGER_FILE`
//! environment variable (the storage key whose creation fired the event).

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use advariant_storage::StorageClient;
use advariant_worker::end_slate::EndSlateProcessor;
use advariant_worker::gemini::GeminiClient;
use advariant_worker::{fanin, RenderContext, TriggerFile, TriggerKind, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("advariant_worker=info".parse().unwrap())
        .add_directive("advariant_media=info".parse().unwrap())
        .add_directive("advariant_storage=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting advariant-worker");

    let trigger_path = match std::env::var("TRIGGER_FILE") {
        Ok(path) => path,
        Err(_) => {
            error!("TRIGGER_FILE not set");
            std::process::exit(1);
        }
    };

    let trigger = match TriggerFile::parse(&trigger_path) {
        Ok(trigger) => trigger,
        Err(e) => {
            error!("Invalid trigger: {}", e);
            std::process::exit(1);
        }
    };

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let storage = match StorageClient::from_env().await {
        Ok(storage) => storage,
        Err(e) => {
            error!("Failed to create storage client: {}", e);
            std::process::exit(1);
        }
    };

    // The generative model is only used for supplementary assets; a
    // missing API key downgrades those paths instead of failing startup.
    let gemini = match GeminiClient::new(config.gemini_model.clone(), config.gemini_timeout) {
        Ok(client) => Some(client),
        Err(e) => {
            info!("Generative model unavailable ({}); asset generation disabled", e);
            None
        }
    };

    let result = match trigger.kind() {
        TriggerKind::InitialRender => {
            let ctx = RenderContext::new(storage, gemini, config);
            ctx.initial_render(&trigger).await
        }
        TriggerKind::VariantRender { variant_id, total } => {
            let ctx = RenderContext::new(storage, gemini, config);
            ctx.render_variant(&trigger, variant_id, total).await
        }
        TriggerKind::FinaliseRender { .. } => fanin::finalise_render(&storage, &trigger.folder).await,
        TriggerKind::EndSlate => {
            EndSlateProcessor::new(&storage, &config).process(&trigger).await
        }
        TriggerKind::Unknown => {
            info!(file = %trigger.file_name, "Not a trigger for this worker; ignoring");
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("Job failed: {}", e);
        std::process::exit(1);
    }

    info!("Worker finished");
}
