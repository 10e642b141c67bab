//! Novel generation - `quill run`.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument::WithSubscriber;
use tracing::{info, warn};

use super::super::Cli;

pub async fn cmd_run(
    cli: &Cli,
    project_dir: PathBuf,
    theme: Option<String>,
    wait_for_start: bool,
) -> Result<()> {
    use quill::approval::{ApprovalGate, ChatChannel, ConsoleMode, TelegramChannel};
    use quill::config::Config;
    use quill::generation::{GeminiGenerator, GenerationClient};
    use quill::logging;
    use quill::pipeline::{Pipeline, ProjectRun, PromptTemplates, Services, Stage};
    use quill::ui::PipelineUI;
    use quill::writer::CliWriter;

    let config = Config::new(project_dir, cli.output_dir.clone(), cli.verbose, cli.yes)?;
    config.ensure_directories()?;
    for warning in config.toml.validate() {
        warn!("{}", warning);
    }

    let api_key = config
        .secrets
        .gemini_api_key
        .as_deref()
        .context("GEMINI_API_KEY is not set. Export it or add it to .env.")?;
    let backend = GeminiGenerator::new(api_key, &config.toml.generation)?;
    let generator = GenerationClient::new(Arc::new(backend), &config.toml.generation);

    let channel: Option<Arc<dyn ChatChannel>> = match config.secrets.telegram() {
        Some((token, chat_id)) => Some(Arc::new(TelegramChannel::new(token, chat_id)?)),
        None => None,
    };
    let console = if config.yes {
        ConsoleMode::AutoAccept
    } else {
        ConsoleMode::Interactive
    };
    let gate = ApprovalGate::new(channel, config.toml.approval.clone(), console);

    let memory = build_memory(&config)?;
    memory.probe().await;
    info!(
        chat = gate.has_channel(),
        memory = memory.is_enabled(),
        "Services ready"
    );

    let theme = match theme {
        Some(theme) if !wait_for_start => theme,
        seed => gate.wait_for_start(seed).await?,
    };

    let run = ProjectRun::create(&config.output_base, &theme)?;
    let dispatch = logging::run_dispatch(&run.run_dir, config.verbose)?;
    println!(
        "{} {}",
        console::style("Run directory:").bold(),
        run.run_dir.display()
    );

    let writer = CliWriter::new(&config.toml.writer).with_working_dir(run.run_dir.clone());
    let services = Services {
        generator,
        writer: Arc::new(writer),
        memory,
        gate,
    };
    let ui = Arc::new(PipelineUI::new(Stage::ALL.len() as u64, config.verbose));
    let templates = PromptTemplates::load_or_default(&config.project_dir);

    let pipeline = Pipeline::new(run, services, &config.toml, templates, ui);
    pipeline
        .run()
        .with_subscriber(dispatch)
        .await
        .context("Pipeline run failed")?;

    Ok(())
}

/// Memory is optional: without an embedding key, or when disabled in
/// `quill.toml`, the pipeline runs with a store that remembers nothing.
fn build_memory(config: &quill::config::Config) -> Result<quill::memory::MemoryStore> {
    use quill::memory::{MemoryStore, OpenAiEmbedder, QdrantIndex};

    let settings = &config.toml.memory;
    if !settings.enabled {
        return Ok(MemoryStore::disabled());
    }
    let Some(api_key) = config.secrets.openai_api_key.as_deref() else {
        warn!("OPENAI_API_KEY is not set, running without memory");
        return Ok(MemoryStore::disabled());
    };

    let timeout = Duration::from_secs(settings.timeout_secs);
    let embedder = OpenAiEmbedder::new(api_key, &settings.embedding_model, timeout)?;
    let index = QdrantIndex::new(&settings.url, &settings.collection, timeout)?;
    Ok(MemoryStore::new(
        Arc::new(embedder),
        Arc::new(index),
        settings,
    ))
}
