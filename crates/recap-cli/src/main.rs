use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use recap_agents::{RELAY_BUFFER, RelaySink, StreamEvent, SummaryRuntime};
use recap_common::StatusKind;
use recap_config::{AppConfig, ConfigLoader};
use recap_db::{SqliteStore, SummaryStore};
use recap_gateway::{AppState, GatewayServer};
use tracing::info;

mod logging;

#[derive(Parser)]
#[command(name = "recap", version, about = "Streaming work-status summaries")]
struct Cli {
    /// Path to the config file.
    #[arg(short, long, global = true, env = "RECAP_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Generate a summary now and stream it to stdout.
    Generate,
    /// Add a status record.
    Add {
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
        #[arg(short, long, value_enum, default_value_t = KindArg::Ongoing)]
        kind: KindArg,
    },
    /// List status records.
    List {
        /// Print records as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the stored summary.
    Summary,
    /// Print the status description and the prompt that would be sent.
    Prompt,
    /// Write a default config file.
    Init,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Ongoing,
    Planned,
    Completed,
}

impl From<KindArg> for StatusKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Ongoing => StatusKind::Ongoing,
            KindArg::Planned => StatusKind::Planned,
            KindArg::Completed => StatusKind::Completed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_json);

    let loader = ConfigLoader::new(cli.config);
    if let Command::Init = cli.command {
        loader.write_default()?;
        println!("wrote {}", loader.path().display());
        return Ok(());
    }

    let config = loader
        .load()
        .with_context(|| format!("loading {}", loader.path().display()))?;
    run(cli.command, config).await
}

async fn run(command: Command, mut config: AppConfig) -> Result<()> {
    match command {
        Command::Init => bail!("init is handled before the config is loaded"),
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            let state = AppState::from_config(config).context("starting gateway")?;
            GatewayServer::new(Arc::new(state)).run().await?;
        }
        Command::Generate => generate(&config).await?,
        Command::Add {
            title,
            description,
            kind,
        } => {
            if title.trim().is_empty() {
                bail!("title must not be empty");
            }
            let store = open_store(&config)?;
            let record = store.add_record(&title, &description, kind.into())?;
            println!("{}", record.id);
        }
        Command::List { json } => {
            let records = open_store(&config)?.list_records()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for record in records {
                    let mark = if record.completed { "x" } else { " " };
                    let processed = if record.processed { " (summarized)" } else { "" };
                    println!(
                        "[{mark}] {:<9} {} {}{processed}",
                        record.kind.as_str(),
                        record.id,
                        record.title
                    );
                }
            }
        }
        Command::Summary => {
            let summary = open_store(&config)?.get_summary()?;
            if summary.is_blank() {
                println!("(no summary yet)");
            } else {
                println!("{}", summary.text);
            }
        }
        Command::Prompt => {
            let store = Arc::new(open_store(&config)?);
            let runtime = SummaryRuntime::from_config(&config, store)?;
            println!("{}", runtime.preview_prompt()?);
        }
    }

    Ok(())
}

fn open_store(config: &AppConfig) -> Result<SqliteStore> {
    SqliteStore::open(&config.storage.db_path)
        .with_context(|| format!("opening {}", config.storage.db_path.display()))
}

async fn generate(config: &AppConfig) -> Result<()> {
    let store = Arc::new(open_store(config)?);
    let runtime = Arc::new(SummaryRuntime::from_config(config, store)?);

    let (sink, mut rx) = RelaySink::channel(RELAY_BUFFER);
    let task = {
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move { runtime.generate(sink).await })
    };

    let mut stdout = std::io::stdout();
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Content(c) => {
                write!(stdout, "{c}")?;
                stdout.flush()?;
            }
            StreamEvent::Done(_) => {
                writeln!(stdout)?;
                break;
            }
            StreamEvent::Error(message) => {
                writeln!(stdout)?;
                bail!("generation failed: {message}");
            }
        }
    }

    let outcome = task.await.context("generation task panicked")??;
    info!(model = %outcome.model, "summary saved");
    Ok(())
}
