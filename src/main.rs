// src/main.rs — layout-copilot entry point

use std::sync::Arc;

use clap::Parser;

use layout_copilot::api::{self, ApiState};
use layout_copilot::cli::{plan, progress, Cli, Commands};
use layout_copilot::core::pipeline::LayoutPipeline;
use layout_copilot::core::prompts::PromptLibrary;
use layout_copilot::core::strategist::{Strategist, StrategistEvent};
use layout_copilot::core::types::StrategistConfig;
use layout_copilot::infra::config::Config;
use layout_copilot::infra::logger;
use layout_copilot::market::geo::supported_cities;
use layout_copilot::market;
use layout_copilot::provider::openai::OpenAIProvider;
use layout_copilot::provider::retry::{RetryConfig, RetryProvider};
use layout_copilot::provider::ModelProvider;
use layout_copilot::render::SvgRenderer;
use layout_copilot::retrieval;

type ProgressCallback = Box<dyn Fn(StrategistEvent) + Send + Sync>;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Falls back to defaults if no config.toml
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    logger::init_logging(level);

    match cli.command {
        Commands::Cities => {
            for city in supported_cities(&config.market.supported_cities) {
                let geo = &config.market.supported_cities[city];
                println!("{city}\t{}\t{}", geo.sub_geo, geo.state);
            }
            Ok(())
        }
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.api.host = host;
            }
            if let Some(port) = port {
                config.api.port = port;
            }
            let pipeline = build_pipeline(&config, None)?;
            let token = config
                .api
                .token_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok());
            if token.is_none() {
                tracing::warn!("No API token configured; /api/v1/layouts is open");
            }
            let state = ApiState::new(Arc::new(pipeline)).with_token(token);
            api::start_server(&config.api, state).await
        }
        Commands::Plan(args) => {
            if let Some(n) = args.max_iterations {
                config.strategist.max_iterations = n;
            }
            if let Some(t) = args.threshold {
                config.strategist.acceptance_threshold = t;
            }
            config.validate()?;

            let on_progress = (!args.quiet).then(|| {
                Box::new(progress::terminal_progress(config.strategist.max_iterations))
                    as ProgressCallback
            });
            let pipeline = build_pipeline(&config, on_progress)?;
            plan::run_plan(&pipeline, &args).await
        }
    }
}

/// Wire provider, retriever, prompts, strategist, trends and renderer.
fn build_pipeline(
    config: &Config,
    on_progress: Option<ProgressCallback>,
) -> anyhow::Result<LayoutPipeline> {
    let retry = RetryConfig::from(&config.retry);

    let base: Arc<dyn ModelProvider> = Arc::new(OpenAIProvider::from_config(&config.models)?);
    let provider: Arc<dyn ModelProvider> =
        Arc::new(RetryProvider::with_config(base.clone(), retry.clone()));

    // Query embeddings go through the bare provider; the retriever retries them.
    let retriever = retrieval::from_config(&config.retrieval, base, retry.clone())?;
    let trends = market::from_config(&config.market, retry)?;

    let prompts = Arc::new(PromptLibrary::from_config(&config.prompts)?);
    tracing::debug!(variant = prompts.variant(), "Prompt templates loaded");

    let mut strategist = Strategist::new(
        provider,
        retriever,
        prompts,
        StrategistConfig::from(config),
    );
    if let Some(cb) = on_progress {
        strategist = strategist.with_progress(cb);
    }

    Ok(LayoutPipeline::new(
        config.market.clone(),
        trends,
        Arc::new(strategist),
        Arc::new(SvgRenderer::default()),
    ))
}
