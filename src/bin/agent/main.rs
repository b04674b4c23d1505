mod face;
mod hands;

use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use web_navigator::{
    Agent, AgentConfig, BrowserConfig, LocalizationMode, ModelConfig, OpenAiModel, TaskStatus,
    VisionModel,
};

#[derive(Parser, Debug)]
#[command(name = "agent", version, about = "Drive a browser from screenshots with a vision model")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Run Chrome without a window.
    #[arg(long, global = true)]
    headless: bool,

    /// Step budget per task.
    #[arg(long, global = true)]
    max_steps: Option<usize>,

    /// Ask for `Click(x, y)` instead of a JSON object when locating elements.
    #[arg(long, global = true)]
    textual_localization: bool,

    /// Save every observed screenshot here as step-NNN.png.
    #[arg(long, global = true)]
    screenshot_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one task and print the result as JSON.
    Run {
        #[arg(long)]
        task: String,

        #[arg(long)]
        start_url: Option<String>,
    },
    /// Serve a web console that accepts tasks.
    Serve {
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut config = AgentConfig::from_env()?;
    if let Some(max_steps) = cli.max_steps {
        config.max_steps = max_steps;
    }
    if cli.textual_localization {
        config.localization_mode = LocalizationMode::Textual;
    }
    if cli.screenshot_dir.is_some() {
        config.screenshot_dir = cli.screenshot_dir.clone();
    }

    let mut browser = BrowserConfig::from_env()?;
    browser.headless |= cli.headless;

    let model_config = ModelConfig::from_env()?;
    if model_config.api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; requests will likely be rejected");
    }
    let model: Arc<dyn VisionModel> = Arc::new(OpenAiModel::new(model_config)?);

    match cli.command {
        Command::Run { task, start_url } => {
            run_once(model, browser, config, &task, start_url).await
        }
        Command::Serve { port } => serve(model, browser, config, port).await,
    }
}

async fn launch_browser(config: BrowserConfig) -> Result<hands::ChromeBackend> {
    info!("launching Chrome");
    tokio::task::spawn_blocking(move || hands::ChromeBackend::launch(&config))
        .await
        .context("Browser launch panicked")?
}

async fn run_once(
    model: Arc<dyn VisionModel>,
    browser: BrowserConfig,
    config: AgentConfig,
    task: &str,
    start_url: Option<String>,
) -> Result<ExitCode> {
    let backend = launch_browser(browser).await?;
    let mut agent = Agent::new(model, Box::new(backend), config);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if watch_interrupts(tokio::signal::ctrl_c, &on_interrupt).await {
            warn!("interrupted again, exiting");
            std::process::exit(130);
        }
    });

    let result = agent.run_task(task, start_url.as_deref(), &cancel).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(match result.status {
        TaskStatus::Completed => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

/// First interrupt cancels between steps. Returns `true` on the second one,
/// `false` if the signal source fails.
async fn watch_interrupts<F, Fut>(mut next: F, cancel: &CancellationToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    let mut presses = 0;
    while next().await.is_ok() {
        presses += 1;
        if presses > 1 {
            return true;
        }
        warn!("interrupted, stopping after the current step (press Ctrl-C again to quit)");
        cancel.cancel();
    }
    false
}

async fn serve(
    model: Arc<dyn VisionModel>,
    browser: BrowserConfig,
    config: AgentConfig,
    port: u16,
) -> Result<ExitCode> {
    // Console first so the page is reachable while Chrome starts.
    let mut console = face::start_server(port).await?;
    let backend = launch_browser(browser).await?;
    let mut agent =
        Agent::new(model, Box::new(backend), config).with_events(console.events.clone());
    info!("waiting for tasks");

    while let Some(request) = console.commands.recv().await {
        let result = agent.run_task(&request.task, None, &request.cancel).await;
        console.finish_task();
        info!(status = ?result.status, steps = result.total_steps, "task finished");
    }

    Ok(ExitCode::SUCCESS)
}
