use text2sql_assistant::config::{AppConfig, Provider};
use text2sql_assistant::db::{DatasetLoader, QueryExecutor, QueryHistory};
use text2sql_assistant::llm::LlmClient;
use text2sql_assistant::render;
use text2sql_assistant::schema_info;
use text2sql_assistant::state::AgentState;
use text2sql_assistant::workflow::{self, Workflow, WorkflowEvent};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "text2sql")]
#[command(about = "Ask questions about the e-commerce database in plain language")]
#[command(version)]
struct Args {
    /// SQLite database file (or set TEXT2SQL_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Model name (or set TEXT2SQL_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Model provider: ollama or openai (or set TEXT2SQL_PROVIDER)
    #[arg(long, global = true)]
    provider: Option<Provider>,

    /// Put the scope check in front of SQL generation
    #[arg(long, global = true)]
    guardrails: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single question and exit
    Ask {
        question: String,

        /// Print the final state as JSON instead of the rendered answer
        #[arg(long)]
        json: bool,
    },
    /// Interactive chat with step-by-step progress
    Chat {
        /// Directory where chart JSON files are written
        #[arg(long, default_value = "charts")]
        chart_dir: PathBuf,
    },
    /// Build the SQLite database from the Olist CSV files
    LoadDb {
        /// Directory holding the dataset CSV files
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,
    },
    /// Print the workflow as a Mermaid flowchart
    Diagram,
    /// List recent runs (needs TEXT2SQL_HISTORY_DB)
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Check that the model server is reachable
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    match args.command {
        Commands::Ask { question, json } => {
            let workflow = Workflow::from_config(&config)?;
            let history = open_history(&config)?;
            let state = workflow.run(&question).await?;
            record(history.as_ref(), &state);

            if json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                println!("{}", render::final_response(&state));
                if !state.graph_json.is_empty() {
                    println!("\n{}", state.graph_json);
                }
            }
        }
        Commands::Chat { chart_dir } => {
            let workflow = Arc::new(Workflow::from_config(&config)?);
            let history = open_history(&config)?;
            chat(workflow, history.as_ref(), &chart_dir).await?;
        }
        Commands::LoadDb { data_dir } => {
            let loaded = DatasetLoader::new(&data_dir)
                .create_database(&config.db_path)
                .with_context(|| format!("loading dataset from {}", data_dir.display()))?;
            for table in &loaded {
                println!("✅ {} ({} rows, {} columns)", table.table, table.rows, table.columns.len());
            }
            check_tables(&config)?;
            println!("Database ready: {}", config.db_path.display());
        }
        Commands::Diagram => {
            println!("{}", workflow::topology_mermaid(config.guardrails_enabled));
        }
        Commands::History { limit } => {
            let history = open_history(&config)?
                .context("TEXT2SQL_HISTORY_DB is not set")?;
            for entry in history.recent(limit)? {
                println!(
                    "{} [{}] {} (iterations: {})",
                    entry.created_at,
                    entry.status.as_str(),
                    entry.question,
                    entry.iterations
                );
                if !entry.sql_query.is_empty() {
                    println!("    {}", entry.sql_query.replace('\n', " "));
                }
                if let Some(err) = entry.error {
                    println!("    error: {}", err);
                }
            }
        }
        Commands::Health => {
            let client = LlmClient::new(config.llm.clone())?;
            let llm = client.config();
            let model_ok = client.health_check().await;
            if model_ok {
                println!("[OK] {} at {} is reachable", llm.provider, llm.base_url);
            } else {
                println!("[ERROR] {} at {} is not reachable", llm.provider, llm.base_url);
            }
            let db_ok = match check_tables(&config) {
                Ok(()) => true,
                Err(e) => {
                    println!("[ERROR] {:#}", e);
                    false
                }
            };
            if !(model_ok && db_ok) {
                anyhow::bail!("health check failed");
            }
        }
    }

    Ok(())
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = AppConfig::from_env().context("invalid configuration")?;
    if let Some(db) = &args.db {
        config.db_path = db.clone();
    }
    if let Some(provider) = args.provider {
        if provider != config.llm.provider {
            config.llm.base_url = provider.default_base_url().to_string();
        }
        config.llm.provider = provider;
    }
    if let Some(model) = &args.model {
        config.llm.model = model.clone();
    }
    if args.guardrails {
        config.guardrails_enabled = true;
    }
    config.validate()?;
    Ok(config)
}

/// Confirm the database holds every table the prompts describe.
fn check_tables(config: &AppConfig) -> Result<()> {
    let executor = QueryExecutor::open(&config.db_path, config.max_result_rows)
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    let missing = schema_info::missing_tables(&executor.table_names()?);
    if !missing.is_empty() {
        anyhow::bail!(
            "{} is missing tables: {} (run `text2sql load-db`)",
            config.db_path.display(),
            missing.join(", ")
        );
    }
    println!("[OK] {} has all {} tables", config.db_path.display(), schema_info::TABLES.len());
    Ok(())
}

fn open_history(config: &AppConfig) -> Result<Option<QueryHistory>> {
    config
        .history_db
        .as_ref()
        .map(|path| {
            QueryHistory::open(path).with_context(|| format!("opening history {}", path.display()))
        })
        .transpose()
}

fn record(history: Option<&QueryHistory>, state: &AgentState) {
    if let Some(history) = history {
        if let Err(e) = history.record(state) {
            warn!("Failed to record run: {}", e);
        }
    }
}

async fn chat(workflow: Arc<Workflow>, history: Option<&QueryHistory>, chart_dir: &Path) -> Result<()> {
    println!("{}\n", render::WELCOME_MESSAGE);

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit" | "/exit" | "/quit") {
            break;
        }

        println!("🤖 Agent Workflow");
        let mut events = Arc::clone(&workflow).stream(question);
        let mut final_state = None;
        while let Some(event) = events.recv().await {
            println!("{}", render::event_text(&event));
            match event {
                WorkflowEvent::Final { state } => final_state = Some(state),
                WorkflowEvent::Error { message } => error!("Run failed: {}", message),
                _ => {}
            }
        }

        if let Some(state) = final_state {
            println!("\n{}\n", render::final_response(&state));
            if state.needs_graph && !state.graph_json.is_empty() {
                match write_chart(chart_dir, &state) {
                    Ok(path) => println!("📈 Chart written to {}\n", path.display()),
                    Err(e) => warn!("Could not write chart: {}", e),
                }
            }
            record(history, &state);
        }
    }

    println!("{}", render::GOODBYE_MESSAGE);
    Ok(())
}

fn write_chart(dir: &Path, state: &AgentState) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!(
        "{}_{}.json",
        state.graph_type,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ));
    fs::write(&path, &state.graph_json)?;
    info!("Chart saved: {}", path.display());
    Ok(path)
}
