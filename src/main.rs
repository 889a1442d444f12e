mod config;
mod consultation;
mod instrumentation;
mod llm;
mod patient;
mod report;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write as _;
use std::time::Instant;

use config::Config;
use consultation::stage::Stage;
use consultation::{Consultation, TurnOutcome};
use instrumentation::{SessionLog, SessionLogger, TurnLog};
use llm::{ChatClient, Gateway, ModelSet, ResearchClient};
use patient::{IntakeForm, PatientStore};

#[derive(Parser)]
#[command(
    name = "consult-agent",
    about = "Chat-driven AI medical consultation with report export"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose per-turn output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the patient used by subsequent consultations
    Intake {
        #[arg(long)]
        nickname: String,
        /// ISO date, e.g. 1990-01-01
        #[arg(long)]
        date_of_birth: String,
        #[arg(long)]
        gender: String,
        #[arg(long)]
        medical_history: Option<String>,
        #[arg(long)]
        allergies: Option<String>,
        #[arg(long)]
        current_medications: Option<String>,
    },
    /// Run an interactive consultation for the stored patient
    Consult {
        /// Patient identifier to check against the stored record
        patient_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Intake {
            nickname,
            date_of_birth,
            gender,
            medical_history,
            allergies,
            current_medications,
        } => run_intake(IntakeForm {
            nickname,
            date_of_birth,
            gender,
            medical_history,
            allergies,
            current_medications,
        }),
        Commands::Consult { patient_id } => run_consult(patient_id, cli.verbose).await,
    }
}

fn run_intake(form: IntakeForm) -> Result<()> {
    let profile = match form.validate() {
        Ok(profile) => profile,
        Err(errors) => {
            for error in &errors {
                eprintln!("  - {error}");
            }
            anyhow::bail!("intake validation failed");
        }
    };

    let store = PatientStore::open(&Config::data_dir_from_env());
    store.save(&profile)?;
    println!(
        "Patient {} registered with id {}",
        profile.nickname, profile.id
    );
    Ok(())
}

async fn run_consult(patient_id: Option<String>, verbose: bool) -> Result<()> {
    let config = Config::from_env()?;
    let store = PatientStore::open(&config.data_dir());
    let patient = match &patient_id {
        Some(id) => store.load_checked(id)?,
        None => store.load()?,
    };

    let chat = ChatClient::new(
        &config.chat_api_url,
        &config.chat_api_key,
        config.request_timeout(),
    );
    let research = ResearchClient::new(
        &config.research_api_url,
        &config.research_api_key,
        config.request_timeout(),
    );
    let gateway = Gateway::new(chat, research, ModelSet::from(&config));
    let logger = SessionLogger::new(&config.data_dir().join("logs"))?;

    let mut session = Consultation::new(gateway, patient);
    let started = chrono::Utc::now().to_rfc3339();
    let mut turns: Vec<TurnLog> = Vec::new();
    let mut report_generated = false;
    let mut hinted = false;

    for entry in session.transcript().entries() {
        println!("{}\n", entry.content);
    }

    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "/quit" {
            break;
        }
        if input == "/report" {
            if !session.stage().is_terminal() {
                println!("The report becomes available once the consultation is complete.\n");
                continue;
            }
            match session.generate_report().await {
                Ok(doc) => {
                    let path = format!("{}.pdf", doc.file_stem);
                    std::fs::write(&path, &doc.pdf).context("Failed to write report PDF")?;
                    if verbose {
                        let html_path = format!("{}.html", doc.file_stem);
                        std::fs::write(&html_path, &doc.html)
                            .context("Failed to write report HTML")?;
                    }
                    report_generated = true;
                    println!("Report saved to {path}\n");
                }
                Err(err) => eprintln!("Could not generate the report: {err}"),
            }
            continue;
        }

        let start = Instant::now();
        let outcome = session.handle_message(input).await;
        record_turn(&mut turns, &outcome, start);
        print_outcome(&outcome);
        if verbose {
            eprintln!(
                "[stage={} phase={:?} latency={}ms]",
                session.stage(),
                session.differential_phase(),
                start.elapsed().as_millis()
            );
        }

        if let Some(delay) = outcome.auto_continue {
            // Owned by this loop: quitting before the delay elapses
            // suppresses the continuation.
            tokio::time::sleep(delay).await;
            let start = Instant::now();
            let continued = session.continue_treatment().await;
            record_turn(&mut turns, &continued, start);
            print_outcome(&continued);
        }

        if session.stage() == Stage::Report && !hinted {
            hinted = true;
            println!(
                "Your consultation is complete. Type /report to save your medical report, \
                 or keep asking questions.\n"
            );
        }
    }

    let log = SessionLog {
        id: session.id().to_string(),
        timestamp: started,
        patient_id: session.patient().id.clone(),
        turns,
        final_stage: session.stage().to_string(),
        diagnosis_count: session.diagnoses().len(),
        report_generated,
    };
    logger.write(&log)?;
    println!("{}", log.summary());
    Ok(())
}

fn record_turn(turns: &mut Vec<TurnLog>, outcome: &TurnOutcome, start: Instant) {
    let Some(first) = outcome.replies.first() else {
        return;
    };
    turns.push(TurnLog {
        stage: first.stage.to_string(),
        latency_ms: start.elapsed().as_millis() as u64,
        fell_back: outcome.fell_back,
        is_error: outcome.replies.iter().any(|r| r.is_error),
    });
}

fn print_outcome(outcome: &TurnOutcome) {
    for entry in &outcome.replies {
        println!("\n{}\n", entry.content);
    }
}
