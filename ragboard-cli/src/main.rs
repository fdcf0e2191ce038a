use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use ragboard_core::config::Config;
use ragboard_core::provider::{Message, OpenAiCompatProvider};
use ragboard_core::{sql, write_sse, AnswerOverrides, CatalogDiscoverer, ChatService, RagPipeline, Storage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ragboard")]
#[command(about = "Ask questions about project-board data through a guarded text-to-SQL pipeline", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Show current configuration")]
    Show,

    #[command(about = "Discover and print the board property catalog")]
    Catalog,

    #[command(about = "Check a SQL statement against the read-only guard")]
    Validate {
        #[arg(help = "SQL text, or raw model output containing it")]
        sql: String,
    },

    #[command(about = "Print the augmented prompt a question would produce")]
    Prepare {
        #[arg(short, long, help = "Id of the asking user")]
        user: String,

        question: String,
    },

    #[command(about = "Answer a question, streaming SSE events to stdout")]
    Ask {
        #[arg(short, long, help = "Id of the asking user")]
        user: String,

        #[arg(long, help = "Model for this answer (default: llm.model)")]
        model: Option<String>,

        #[arg(long, help = "Sampling temperature for this answer")]
        temperature: Option<f64>,

        #[arg(long, help = "Token limit for this answer")]
        max_tokens: Option<u32>,

        message: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Show => show_config(&cli.config),
        Commands::Catalog => runtime()?.block_on(show_catalog(&cli.config)),
        Commands::Validate { sql } => validate_sql(&sql),
        Commands::Prepare { user, question } => runtime()?.block_on(prepare(&cli.config, &user, &question)),
        Commands::Ask { user, model, temperature, max_tokens, message } => {
            let overrides = AnswerOverrides { model, temperature, max_tokens };
            runtime()?.block_on(ask(&cli.config, &user, &message, &overrides))
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("Failed to start async runtime")
}

fn load_config(config_path: &Path) -> Result<Config> {
    if config_path.exists() {
        Config::load(config_path).with_context(|| format!("Failed to load config from {}", config_path.display()))
    } else {
        Ok(Config::default())
    }
}

fn show_config(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let key_state = if config.llm.api_key().is_some() { "set".green() } else { "missing".red() };

    println!("{}", "Current Configuration:".bold().green());
    println!();
    println!("{}", "LLM:".bold());
    println!("  Model:          {}", config.llm.resolved_model().cyan());
    if let Some(model_env) = &config.llm.model_env {
        println!("  Model Env:      {}", model_env);
    }
    println!("  Base URL:       {}", config.llm.base_url);
    println!("  API Key Env:    {} ({})", config.llm.api_key_env, key_state);
    println!("  Temperature:    {}", config.llm.temperature);
    println!("  Max Tokens:     {}", config.llm.max_tokens);
    println!("  Timeout:        {}s", config.llm.timeout_secs);
    println!();
    println!("{}", "Answer:".bold());
    println!("  Temperature:    {}", config.answer.temperature);
    println!("  Max Tokens:     {}", config.answer.max_tokens);
    println!();
    println!("{}", "Storage:".bold());
    println!("  Engine:         {}", config.storage.db_type);
    println!("  Database:       {}", config.storage.db_path.cyan());
    println!("  Busy Timeout:   {}ms", config.storage.busy_timeout_ms);
    println!();
    println!("{}", "RAG:".bold());
    println!("  Row Limit:      {}", config.rag.row_limit);
    println!("  Fallback Limit: {}", config.rag.fallback_limit);

    Ok(())
}

async fn show_catalog(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let catalog = CatalogDiscoverer::new(Storage::new(config.storage))
        .discover()
        .await
        .context("Failed to discover property catalog")?;

    if catalog.is_empty() {
        println!("{}", "No person, status or date properties found".yellow());
        return Ok(());
    }

    println!("{}", "Property Catalog:".bold().green());
    println!("  Person:       {}", catalog.person_props.join(", "));
    println!("  Multi-person: {}", catalog.multi_person_props.join(", "));
    println!("  Date:         {}", catalog.date_props.join(", "));
    for (prop_id, options) in &catalog.status_options {
        println!("  Status {}:", prop_id.cyan());
        for (label, option_id) in options {
            println!("    {label} = {option_id}");
        }
    }

    Ok(())
}

fn validate_sql(raw: &str) -> Result<()> {
    let candidate = sql::extract_sql(raw);
    match sql::validate(candidate) {
        Ok(sql) => {
            println!("{} {}", "✓".green(), sql);
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            std::process::exit(1);
        }
    }
}

async fn prepare(config_path: &Path, user: &str, question: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let provider = Arc::new(OpenAiCompatProvider::new(&config.llm));
    let pipeline = RagPipeline::new(config, provider);

    match pipeline.prepare(user, question).await {
        Ok(prompt) => println!("{prompt}"),
        Err(e) if e.is_chat_signal() => println!("{}", "Plain chat, no board data needed".yellow()),
        Err(e) => println!("{} {}", "RAG unavailable, would answer as plain chat:".yellow(), e),
    }

    Ok(())
}

async fn ask(config_path: &Path, user: &str, message: &str, overrides: &AnswerOverrides) -> Result<()> {
    let config = load_config(config_path)?;
    let provider = Arc::new(OpenAiCompatProvider::new(&config.llm));
    let service = ChatService::new(config, provider);

    let (sender, receiver) = mpsc::unbounded_channel();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        write_sse(&mut stdout, receiver).await
    });

    let history = vec![Message::user(message)];
    let answered = service.stream_answer(user, message, history, overrides, &sender).await;
    drop(sender);

    writer.await.context("SSE writer task panicked")?.context("Failed to write SSE output")?;
    answered.context("Answer stream failed")?;

    Ok(())
}
