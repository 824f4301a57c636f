//! Command-line front end for the listening coach.
//!
//! Usage:
//!   listening-coach feedback --material m.json --answers a.json [--transcript t.json]
//!   listening-coach speaking --material m.json [--answers a.json] [--score 80]
//!   listening-coach recommend --answers a.json --catalog c.json
//!   listening-coach assess --answers a.json
//!   listening-coach evaluate-speaking --question "..." --answer "..." [--reference "..."]
//!   listening-coach sample-tasks
//!
//! Output is pretty JSON on stdout; logs go to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;
use tracing_subscriber::EnvFilter;

use listening_coach::ListeningCoach;
use listening_coach::clients::OfflineTransport;
use listening_coach::config::Config;
use listening_coach::schemas::{Material, MaterialCatalogEntry, UserAnswer};
use listening_coach::speaking::sample_tasks;

#[derive(Parser)]
#[command(name = "listening-coach")]
#[command(about = "Listening feedback, speaking practice and material recommendations", long_about = None)]
struct Cli {
    /// Never contact the generative service; every answer comes from the fallback path
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Learning feedback for one completed exercise
    Feedback {
        #[arg(long)]
        material: PathBuf,
        #[arg(long)]
        answers: PathBuf,
        #[arg(long)]
        transcript: Option<PathBuf>,
    },
    /// Speaking tasks for a material, targeted when answers are given
    Speaking {
        #[arg(long)]
        material: PathBuf,
        #[arg(long)]
        answers: Option<PathBuf>,
        #[arg(long)]
        score: Option<u32>,
    },
    /// Analyze answers and recommend catalog materials
    Recommend {
        #[arg(long)]
        answers: PathBuf,
        #[arg(long)]
        catalog: PathBuf,
    },
    /// Estimate the learner's listening level
    Assess {
        #[arg(long)]
        answers: PathBuf,
    },
    /// Evaluate a transcribed speaking answer
    EvaluateSpeaking {
        #[arg(long)]
        question: String,
        #[arg(long)]
        answer: String,
        #[arg(long)]
        reference: Option<String>,
    },
    /// Print the fixed starter speaking tasks
    SampleTasks,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.runtime.log_level)
                .unwrap_or_else(|_| EnvFilter::new(listening_coach::config::DEFAULT_LOG_LEVEL)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Commands::SampleTasks = cli.command {
        return print_json(&sample_tasks());
    }

    let coach = if cli.offline {
        info!("Offline mode: serving fallback output only");
        ListeningCoach::with_transport(&config, Arc::new(OfflineTransport))
    } else {
        ListeningCoach::from_config(&config)?
    };

    match cli.command {
        Commands::Feedback {
            material,
            answers,
            transcript,
        } => {
            let material: Material = read_json(&material)?;
            let answers: Vec<UserAnswer> = read_json(&answers)?;
            let transcript: Option<serde_json::Value> =
                transcript.as_deref().map(read_json::<serde_json::Value>).transpose()?;
            let report = coach
                .learning_feedback(&material, &answers, transcript.as_ref())
                .await;
            print_json(&report)
        }
        Commands::Speaking {
            material,
            answers,
            score,
        } => {
            let material: Material = read_json(&material)?;
            let answers: Option<Vec<UserAnswer>> = answers
                .as_deref()
                .map(read_json::<Vec<UserAnswer>>)
                .transpose()?;
            let tasks = coach
                .speaking_tasks(&material, answers.as_deref(), score)
                .await;
            print_json(&tasks)
        }
        Commands::Recommend { answers, catalog } => {
            let answers: Vec<UserAnswer> = read_json(&answers)?;
            let catalog: Vec<MaterialCatalogEntry> = read_json(&catalog)?;
            print_json(&coach.recommend(&answers, &catalog).await)
        }
        Commands::Assess { answers } => {
            let answers: Vec<UserAnswer> = read_json(&answers)?;
            print_json(&coach.assess_level(&answers).await)
        }
        Commands::EvaluateSpeaking {
            question,
            answer,
            reference,
        } => {
            let evaluation = coach
                .evaluate_speaking(&answer, &question, reference.as_deref())
                .await;
            print_json(&evaluation)
        }
        Commands::SampleTasks => print_json(&sample_tasks()),
    }
}
