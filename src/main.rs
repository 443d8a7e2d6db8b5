mod client;
mod config;
mod conversation;
mod error;
mod intake;
mod logging;
mod prompts;
mod store;
mod workflow;

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};

use crate::client::OpenAiClient;
use crate::config::Config;
use crate::conversation::Role;
use crate::error::WorkflowError;
use crate::store::SessionStore;
use crate::workflow::Workflow;

#[derive(Parser)]
#[command(name = "pbl-coach", version, about)]
struct Cli {
    /// Path to a config file, bypassing the platform default.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start or resume an interactive design session (default).
    Chat {
        /// Resume a saved session by id.
        #[arg(long)]
        session: Option<String>,
    },
    /// List saved sessions.
    Sessions,
    /// Delete a saved session.
    Delete {
        #[arg(long)]
        session: String,
    },
    /// Export the finished plan for a session.
    Export {
        #[arg(long)]
        session: String,
        /// Output file. Defaults to the configured exports directory.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let start_time = Instant::now();

    // Pick up OPENAI_API_KEY and friends from a local .env if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging before anything else
    let logging_context = match logging::init() {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            eprintln!("Warning: Failed to initialize logging: {}", e);
            None
        }
    };
    if let Some(ctx) = &logging_context {
        logging::cleanup_old_logs(&ctx.log_directory);
    }

    // Load configuration
    let loaded_config = match &cli.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    };
    debug!(
        config_path = %loaded_config.config_path.display(),
        status = ?loaded_config.status,
        "config_loaded"
    );

    let invocation_id = logging_context
        .as_ref()
        .map(|ctx| ctx.session_id.clone())
        .unwrap_or_else(logging::generate_session_id);

    let result = match cli.command.unwrap_or(Command::Chat { session: None }) {
        Command::Chat { session } => run_chat(&loaded_config.config, session, invocation_id),
        Command::Sessions => list_sessions(&loaded_config.config),
        Command::Delete { session } => delete_session(&loaded_config.config, &session),
        Command::Export { session, out } => export_session(&loaded_config.config, &session, out),
    };

    // Log session end
    if let Some(ctx) = &logging_context {
        let duration = start_time.elapsed();
        info!(
            session_id = %ctx.session_id,
            duration_secs = duration.as_secs_f64(),
            "session_end"
        );
    }

    result
}

fn open_store(config: &Config) -> Result<SessionStore> {
    match config.sessions_db_path() {
        Some(path) => SessionStore::open(&path),
        None => SessionStore::open_default(),
    }
    .context("failed to open session store")
}

fn run_chat(config: &Config, session: Option<String>, invocation_id: String) -> Result<()> {
    let mut store = open_store(config)?;

    let (session_id, mut workflow) = match session {
        Some(id) => {
            let workflow = store
                .load(&id)?
                .ok_or_else(|| anyhow!("no saved session with id {id:?}"))?;
            info!(session_id = %id, stage = workflow.stage().as_str(), "session_resumed");
            print_transcript(&workflow);
            (id, workflow)
        }
        None => {
            println!("Starting session {invocation_id}");
            (invocation_id, Workflow::new())
        }
    };

    if workflow.final_output().is_some() {
        println!(
            "This session is already complete. Run `pbl-coach export --session {session_id}` \
             to get the plan."
        );
        return Ok(());
    }

    let client =
        OpenAiClient::from_config(&config.api).context("failed to build completion client")?;

    let mut printed = workflow.conversation().len();
    evaluate(&mut workflow, None, &client)?;
    printed = print_new_turns(&workflow, printed);
    store.save(&session_id, &workflow)?;

    let stdin = io::stdin();
    loop {
        if workflow.stage().is_terminal() {
            let path = write_plan(config, &session_id, &workflow)?;
            println!("Plan written to {}", path.display());
            break;
        }

        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            // EOF: the session is saved and can be resumed later
            println!();
            break;
        }
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "/quit" {
            break;
        }

        evaluate(&mut workflow, Some(text), &client)?;
        printed = print_new_turns(&workflow, printed);
        store.save(&session_id, &workflow)?;
    }

    Ok(())
}

/// Run one sequencer evaluation. Completion failures are reported and
/// swallowed so the user can retry; anything else is a real bug and
/// aborts the command.
fn evaluate(workflow: &mut Workflow, input: Option<&str>, client: &OpenAiClient) -> Result<()> {
    let result = match input {
        Some(text) => workflow.submit(text, client),
        None => workflow.kickoff(client),
    };
    match result {
        Ok(()) => Ok(()),
        Err(WorkflowError::Completion(e)) => {
            warn!(error = %e, stage = workflow.stage().as_str(), "completion_failed");
            eprintln!("(completion failed: {e}; your message was kept, try again)");
            Ok(())
        }
        Err(e) => Err(e).context("workflow evaluation failed"),
    }
}

/// Print assistant turns appended since `from`; user turns are the ones
/// the user just typed, so they are not echoed back.
fn print_new_turns(workflow: &Workflow, from: usize) -> usize {
    for turn in &workflow.conversation().turns()[from..] {
        if turn.role == Role::Assistant {
            println!("\n{}\n", turn.text);
        }
    }
    workflow.conversation().len()
}

/// Replay a resumed session's conversation so far.
fn print_transcript(workflow: &Workflow) {
    for turn in workflow.conversation().turns() {
        match turn.role {
            Role::User => println!("> {}", turn.text),
            Role::Assistant => println!("\n{}\n", turn.text),
        }
    }
}

fn write_plan(config: &Config, session_id: &str, workflow: &Workflow) -> Result<PathBuf> {
    let output = workflow
        .final_output()
        .ok_or_else(|| anyhow!("session {session_id} has not reached the final stage"))?;
    let path = config.exports_path().join(format!("plan-{session_id}.md"));
    write_plan_to(&path, output)?;
    Ok(path)
}

fn write_plan_to(path: &PathBuf, output: &workflow::FinalOutput) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, output.render())
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "plan_exported");
    Ok(())
}

fn list_sessions(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let sessions = store.list()?;
    if sessions.is_empty() {
        println!("No saved sessions.");
        return Ok(());
    }
    println!("{:<10} {:<28} UPDATED", "SESSION", "STAGE");
    for session in sessions {
        println!(
            "{:<10} {:<28} {}",
            session.id, session.stage, session.updated_at
        );
    }
    Ok(())
}

fn delete_session(config: &Config, session_id: &str) -> Result<()> {
    let mut store = open_store(config)?;
    if store.load(session_id)?.is_none() {
        return Err(anyhow!("no saved session with id {session_id:?}"));
    }
    store.delete(session_id)?;
    println!("Deleted session {session_id}");
    Ok(())
}

fn export_session(config: &Config, session_id: &str, out: Option<PathBuf>) -> Result<()> {
    let store = open_store(config)?;
    let workflow = store
        .load(session_id)?
        .ok_or_else(|| anyhow!("no saved session with id {session_id:?}"))?;
    let output = workflow.final_output().ok_or_else(|| {
        anyhow!(
            "session {session_id} is still at stage {}; finish the chat before exporting",
            workflow.stage().as_str()
        )
    })?;

    let path = match out {
        Some(path) => path,
        None => config.exports_path().join(format!("plan-{session_id}.md")),
    };
    write_plan_to(&path, output)?;
    println!("Exported plan to {}", path.display());
    Ok(())
}
