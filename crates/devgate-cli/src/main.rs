use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use devgate::agent::Agent;
use devgate::approval::ApprovalGate;
use devgate::checkpoint::{validate_thread_id, CheckpointStore, FileCheckpointStore};
use devgate::prompt_template::Preamble;
use devgate::providers::openai::OpenAiProvider;
use devgate::providers::search::{SearchBackend, TavilySearch};
use devgate::providers::transcription::WhisperTranscriber;
use devgate::tools::default_registry;
use tracing_subscriber::EnvFilter;

mod configuration;
mod error;
mod prompt;
mod session;
mod voice;

use configuration::Settings;
use prompt::cliclack::CliclackPrompt;
use session::Session;
use voice::VoiceInput;

const DEFAULT_THREAD: &str = "dev-session";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Instruction to run before the interactive prompt opens
    instruction: Option<String>,

    /// Conversation thread to resume or start
    #[arg(short, long, default_value = DEFAULT_THREAD)]
    thread: String,

    /// Project directory the tools operate in (defaults to the current directory)
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Start a fresh thread with a generated id
    #[arg(long)]
    new_thread: bool,

    /// List stored threads and exit
    #[arg(long)]
    list_threads: bool,

    /// Delete the thread's checkpoint before starting
    #[arg(long)]
    reset: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let settings = Settings::new()?;

    let threads_dir = settings
        .storage
        .threads_dir()
        .context("Could not find a home directory; set DEVGATE_STORAGE__THREADS_DIR")?;
    let store = Arc::new(FileCheckpointStore::new(threads_dir));

    if cli.list_threads {
        return list_threads(store.as_ref()).await;
    }

    let thread_id = if cli.new_thread {
        uuid::Uuid::new_v4().to_string()
    } else {
        cli.thread.clone()
    };
    validate_thread_id(&thread_id)?;
    if cli.reset {
        store.delete(&thread_id).await?;
        println!("{}", style(format!("Reset thread '{}'", thread_id)).dim());
    }

    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let root = root
        .canonicalize()
        .with_context(|| format!("Project directory {} is not accessible", root.display()))?;

    let policy = Arc::new(settings.safety.into_policy());
    let search = match settings.search.into_config() {
        Some(config) => Some(Arc::new(TavilySearch::new(config)?) as Arc<dyn SearchBackend>),
        None => {
            tracing::info!("no search key configured, web search disabled");
            None
        }
    };
    let voice = match settings.transcription.into_config() {
        Some(config) => Some(VoiceInput::new(Arc::new(WhisperTranscriber::new(config)?))),
        None => None,
    };
    let provider = Arc::new(OpenAiProvider::new(settings.provider.into_config()?)?);

    let registry = Arc::new(default_registry(root.clone(), policy.clone(), search)?);
    let gate = ApprovalGate::new(
        registry.clone(),
        policy,
        root.clone(),
        settings.approval.mode,
    );
    let agent = Agent::new(provider, registry, store, Preamble::new(root));

    let mut session = Session::new(agent, gate, CliclackPrompt::new(), voice, thread_id);
    session.start(cli.instruction).await
}

/// Logs go to stderr so they never interleave with the prompt
fn init_logging() {
    let filter = EnvFilter::try_from_env("DEVGATE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn list_threads(store: &dyn CheckpointStore) -> Result<()> {
    let threads = store.list().await?;
    if threads.is_empty() {
        println!("No saved threads.");
        return Ok(());
    }
    for summary in threads {
        println!(
            "{}  {}  {} messages  saved {}",
            style(&summary.thread_id).bold(),
            summary.phase,
            summary.messages,
            summary.saved_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    Ok(())
}
