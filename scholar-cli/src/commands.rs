//! Subcommand handlers.

use crate::render::SessionRenderer;
use crate::{Commands, ConfigAction};
use scholar_core::gateway::{AppState, run_gateway};
use scholar_core::providers::create_provider;
use scholar_core::{
    Language, ResearchPipeline, ScholarConfig, SemanticScholarClient, TranslationCache,
    TranslationOverlay, Translator,
};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    model: Option<String>,
    workspace: &Path,
) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, workspace),
        Commands::Ask {
            question,
            language,
            translate,
        } => {
            let config = load(workspace, model)?;
            handle_ask(&question, language, translate, &config).await
        }
        Commands::Keywords { question } => {
            let config = load(workspace, model)?;
            handle_keywords(&question, &config).await
        }
        Commands::Paper { id } => {
            let config = load(workspace, model)?;
            handle_paper(&id, &config).await
        }
        Commands::Serve { host, port } => {
            let mut config = load(workspace, model)?;
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            handle_serve(&config).await
        }
    }
}

fn load(workspace: &Path, model: Option<String>) -> anyhow::Result<ScholarConfig> {
    let mut config = scholar_core::config::load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    if let Some(model) = model {
        config.llm.model = model;
    }
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }
    Ok(config)
}

fn build_pipeline(config: &ScholarConfig) -> anyhow::Result<ResearchPipeline> {
    let provider = create_provider(&config.llm)?;
    let search = Arc::new(SemanticScholarClient::new(&config.search)?);
    Ok(ResearchPipeline::from_config(config, provider, search))
}

async fn handle_ask(
    question: &str,
    language: Option<Language>,
    translate: bool,
    config: &ScholarConfig,
) -> anyhow::Result<()> {
    let language = language.unwrap_or(config.pipeline.language);
    let pipeline = build_pipeline(config)?;

    let mut renderer =
        SessionRenderer::new(question, language).with_max_retries(config.pipeline.max_retries);
    let (tx, mut rx) = mpsc::channel(256);
    let print = async {
        let mut stdout = std::io::stdout();
        while let Some(event) = rx.recv().await {
            let out = renderer.handle(&event);
            if !out.is_empty() {
                let _ = write!(stdout, "{}", out);
                let _ = stdout.flush();
            }
        }
    };
    let (result, ()) = tokio::join!(pipeline.handle_search(question, language, tx), print);
    result?;

    let mut overlay = TranslationOverlay::new();
    if translate || config.translation.enabled {
        let provider = create_provider(&config.llm)?;
        let cache = Arc::new(TranslationCache::new(config.translation.ttl()));
        let translator =
            Translator::new(provider, cache).with_model(config.llm.models.translation.clone());
        let state = renderer.state();
        let added = overlay
            .populate(
                &translator,
                config.translation.target_lang,
                &state.papers,
                &state.ready_summaries(),
            )
            .await;
        tracing::info!(added, "Translation overlay populated");
        overlay.set_enabled(true);
    }

    print!("{}", renderer.render_results(&overlay));
    Ok(())
}

async fn handle_keywords(question: &str, config: &ScholarConfig) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config)?;
    let keywords = pipeline.keyword_generator().generate(question).await?;
    for keyword in keywords {
        println!("{}", keyword);
    }
    Ok(())
}

async fn handle_paper(id: &str, config: &ScholarConfig) -> anyhow::Result<()> {
    let client = SemanticScholarClient::new(&config.search)?;
    let paper = client.paper_details(id).await?;
    println!("{}", paper.title);
    let mut meta = paper.author_line();
    if let Some(year) = paper.year {
        if !meta.is_empty() {
            meta.push_str(", ");
        }
        meta.push_str(&year.to_string());
    }
    if !meta.is_empty() {
        println!("{}", meta);
    }
    if let Some(venue) = &paper.venue {
        println!("{}", venue);
    }
    if let Some(url) = &paper.url {
        println!("{}", url);
    }
    if let Some(text) = paper.real_abstract() {
        println!("\n{}", text);
    }
    Ok(())
}

async fn handle_serve(config: &ScholarConfig) -> anyhow::Result<()> {
    let provider = create_provider(&config.llm)?;
    let search = Arc::new(SemanticScholarClient::new(&config.search)?);
    let state = AppState::new(config, provider, search);
    println!(
        "Scholar gateway on http://{}:{}",
        config.gateway.host, config.gateway.port
    );
    run_gateway(&config.gateway, state).await?;
    Ok(())
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".scholar");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = ScholarConfig::default().to_toml_string()?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load(workspace, None)?;
            println!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}
