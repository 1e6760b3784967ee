//! tutorctl - command line front end for the science tutor.
//!
//! Runs the orchestrator in-process. The LLM endpoint comes from config;
//! `--no-llm` forces keyword routing with raw expert answers.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use tutor_common::{
    client_from_config, DisabledLlm, KnowledgeBase, LlmClient, Orchestrator, Subject, TutorConfig,
};
use tutorctl::{
    parse_repl_line, parse_subject_arg, render_result, render_stats, render_topics, ReplCommand,
    REPL_HELP, SEPARATOR,
};

#[derive(Parser)]
#[command(name = "tutorctl")]
#[command(about = "Science tutor for secondary-school students", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: $TUTOR_CONFIG, user config, /etc/tutor/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Do not contact the language model
    #[arg(long, global = true)]
    no_llm: bool,

    /// Debug logging on stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question
    Ask {
        /// The question, quoted or as separate words
        #[arg(required = true)]
        question: Vec<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive conversation
    Chat,

    /// List topic keys of a subject
    Topics {
        /// Biology, Physics, Chemistry or StudyGuide
        subject: String,
    },

    /// Show the effective configuration
    Config {
        /// Print the built-in defaults instead
        #[arg(long)]
        print_default: bool,

        /// Write the default config to a file
        #[arg(long, value_name = "PATH")]
        init: Option<PathBuf>,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<TutorConfig> {
    match path {
        Some(p) => TutorConfig::load_from_path(p)
            .with_context(|| format!("failed to load config {}", p.display())),
        None => Ok(TutorConfig::load()),
    }
}

fn build_orchestrator(config: &TutorConfig, no_llm: bool) -> Result<Orchestrator> {
    let kb = KnowledgeBase::from_config(&config.knowledge).context("failed to load knowledge")?;
    debug!(records = kb.total_records(), "knowledge loaded");
    let llm: Arc<dyn LlmClient> = if no_llm {
        Arc::new(DisabledLlm)
    } else {
        client_from_config(config)
    };
    Ok(Orchestrator::new(Arc::new(kb), llm, config))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let color = std::io::stdout().is_terminal();

    match cli.command {
        Commands::Ask { question, json } => {
            let config = load_config(cli.config.as_ref())?;
            let mut orchestrator = build_orchestrator(&config, cli.no_llm)?;
            let result = orchestrator.process_query(&question.join(" ")).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print!("{}", render_result(&result, color));
            }
            if result.is_error() {
                std::process::exit(1);
            }
        }

        Commands::Chat => {
            let config = load_config(cli.config.as_ref())?;
            let orchestrator = build_orchestrator(&config, cli.no_llm)?;
            chat(orchestrator, color).await?;
        }

        Commands::Topics { subject } => {
            let subject = parse_subject_arg(&subject)?;
            let config = load_config(cli.config.as_ref())?;
            let kb = KnowledgeBase::from_config(&config.knowledge)?;
            let topics = if subject == Subject::StudyGuide {
                let mut conditions: Vec<String> = Vec::new();
                for (_, _, rule) in kb.diagnostic().entries() {
                    if !conditions.contains(&rule.condition) {
                        conditions.push(rule.condition.clone());
                    }
                }
                conditions
            } else {
                kb.list_topics(subject)
            };
            print!("{}", render_topics(subject, &topics, color));
        }

        Commands::Config {
            print_default,
            init,
        } => {
            if let Some(path) = init {
                TutorConfig::save_default(&path)?;
                println!("Wrote default config to {}", path.display());
                return Ok(());
            }
            let config = if print_default {
                TutorConfig::default()
            } else {
                load_config(cli.config.as_ref())?
            };
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

async fn chat(mut orchestrator: Orchestrator, color: bool) -> Result<()> {
    let banner = "Science tutor. Ask about biology, physics, chemistry or studying.";
    if color {
        println!("{}", banner.bold());
    } else {
        println!("{}", banner);
    }
    println!("{}", REPL_HELP);
    println!("{}", SEPARATOR);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_repl_line(&line) {
            ReplCommand::Quit => break,
            ReplCommand::Reset => {
                orchestrator.reset();
                println!("Conversation cleared.");
            }
            ReplCommand::Stats => {
                print!("{}", render_stats(&orchestrator.memory().stats(), color));
            }
            ReplCommand::Help => println!("{}", REPL_HELP),
            ReplCommand::Unknown(cmd) => {
                println!("Unknown command {}. {}", cmd, REPL_HELP);
            }
            ReplCommand::Query(text) => {
                let result = orchestrator.process_query(&text).await;
                print!("{}", render_result(&result, color));
                println!();
            }
        }
    }
    Ok(())
}
