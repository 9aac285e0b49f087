use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use archie_chat::{Conversation, CycleOutcome, LlmCompletion, SessionConfig};
use archie_core::{
    tasks, AiSettings, Author, FileStore, KeyValueStore, MermaidMarkdown, Renderer, SessionStore,
    TaskDescriptor,
};

/// Archie - design a software architecture by talking to an LLM
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the design tasks you can start
    Tasks,

    /// Resume the saved session or start a task, then chat
    Chat(ChatArgs),

    /// Print the Mermaid diagram of the saved architecture
    Diagram {
        /// Also write it as Markdown to this file
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Forget the saved session
    Reset,

    /// Store AI provider settings in ~/.archie/settings.json
    Config {
        /// openai, anthropic, google, ollama, groq, mistral or deepseek
        #[arg(long)]
        provider: String,
        #[arg(long)]
        model: String,
        /// Leave out to keep the stored key
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
        /// Seconds to wait for each reply
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[derive(Args)]
struct ChatArgs {
    /// Task id (see `archie tasks`); defaults to the saved session's task
    #[arg(long)]
    task: Option<String>,

    /// Where to keep the rendered diagram (default: ~/.archie/architecture.md)
    #[arg(long, value_name = "FILE")]
    diagram: Option<PathBuf>,

    #[arg(long)]
    provider: Option<String>,

    #[arg(long)]
    model: Option<String>,

    /// Seconds to wait for each reply
    #[arg(long)]
    timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("ARCHIE_LOG")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Tasks => {
            for task in tasks::catalog() {
                println!("{:<16} {}", task.id, task.title);
                println!("{:<16} {}", "", task.description);
            }
        }
        Commands::Chat(args) => chat(args).await?,
        Commands::Diagram { out } => {
            let stored = SessionStore::new(session_store()).load();
            let source = archie_core::project(&stored.architecture.unwrap_or_default());
            print!("{source}");
            if let Some(path) = out {
                write_diagram(&path, &source)?;
                println!("Diagram written to {}", path.display());
            }
        }
        Commands::Reset => {
            SessionStore::new(session_store())
                .reset()
                .context("failed to clear the saved session")?;
            println!("Session cleared.");
        }
        Commands::Config {
            provider,
            model,
            api_key,
            base_url,
            timeout,
        } => {
            let mut settings = archie_core::read_settings();
            settings.provider = provider;
            settings.model = model;
            // Empty key means "keep existing"
            if let Some(key) = api_key.filter(|k| !k.is_empty()) {
                settings.api_key = key;
            }
            if base_url.is_some() {
                settings.base_url = base_url;
            }
            if timeout.is_some() {
                settings.timeout_secs = timeout;
            }
            archie_core::write_settings(&settings).context("failed to save settings")?;
            println!("Settings saved.");
        }
    }

    Ok(())
}

fn session_store() -> FileStore {
    FileStore::new(archie_core::session_dir())
}

fn resolve_task(requested: Option<&str>, store: &FileStore) -> anyhow::Result<TaskDescriptor> {
    if let Some(id) = requested {
        return match tasks::find(id) {
            Some(task) => Ok(task),
            None => {
                let known: Vec<String> = tasks::catalog().into_iter().map(|t| t.id).collect();
                bail!("unknown task {id:?}; available: {}", known.join(", "))
            }
        };
    }
    Ok(SessionStore::new(store.clone())
        .load()
        .task
        .unwrap_or_else(tasks::blank))
}

fn apply_overrides(settings: &mut AiSettings, args: &ChatArgs) {
    if let Some(provider) = &args.provider {
        settings.provider = provider.clone();
    }
    if let Some(model) = &args.model {
        settings.model = model.clone();
    }
    if args.timeout.is_some() {
        settings.timeout_secs = args.timeout;
    }
}

async fn chat(args: ChatArgs) -> anyhow::Result<()> {
    let mut settings = archie_core::read_settings();
    apply_overrides(&mut settings, &args);
    if !archie_core::ai_configured(&settings) {
        bail!(
            "no AI provider configured; run e.g. `archie config --provider ollama --model llama3`"
        );
    }

    let store = session_store();
    let task = resolve_task(args.task.as_deref(), &store)?;
    let engine = LlmCompletion::new(settings.clone())?;
    let conv = Conversation::new(task, engine, store, SessionConfig::from_settings(&settings));
    let diagram_path = args
        .diagram
        .unwrap_or_else(archie_core::default_diagram_path);

    let task = conv.task();
    println!("== {} ==", task.title);
    for turn in conv.turns() {
        print_turn(turn.author, &turn.text);
    }
    refresh_diagram(&conv, &diagram_path);

    println!("(thinking...)");
    let outcome = conv.open().await?;
    report(&conv, outcome, &diagram_path);

    println!("Commands: /diagram, /restart, /quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/diagram" => print!("{}", conv.diagram()),
            "/restart" => {
                conv.restart().context("failed to clear the saved session")?;
                println!("Session cleared. Run `archie chat` to pick a task again.");
                return Ok(());
            }
            _ => {
                println!("(thinking...)");
                match conv.send(&line).await {
                    Ok(outcome) => report(&conv, outcome, &diagram_path),
                    Err(e) => eprintln!("{e}"),
                }
            }
        }
    }

    Ok(())
}

fn print_turn(author: Author, text: &str) {
    match author {
        Author::User => println!("\nyou> {text}"),
        Author::Assistant => println!("\narchie> {text}\n"),
    }
}

fn report<S: KeyValueStore>(
    conv: &Conversation<LlmCompletion, S>,
    outcome: CycleOutcome,
    diagram_path: &Path,
) {
    if outcome == CycleOutcome::Skipped {
        return;
    }
    if let Some(turn) = conv.turns().last() {
        print_turn(turn.author, &turn.text);
    }
    if let CycleOutcome::Applied {
        architecture_changed: true,
    } = outcome
    {
        refresh_diagram(conv, diagram_path);
        println!("(diagram updated: {})", diagram_path.display());
    }
}

fn refresh_diagram<S: KeyValueStore>(conv: &Conversation<LlmCompletion, S>, path: &Path) {
    if let Err(e) = write_diagram(path, &conv.diagram()) {
        tracing::warn!(path = %path.display(), error = %e, "could not write diagram");
    }
}

fn write_diagram(path: &Path, source: &str) -> anyhow::Result<()> {
    let markdown = MermaidMarkdown
        .render(source)
        .context("diagram source could not be rendered")?;
    archie_core::write_atomic(path, &markdown)
        .with_context(|| format!("failed to write {}", path.display()))
}
