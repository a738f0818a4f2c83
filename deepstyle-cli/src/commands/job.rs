//! Job command handlers
//!
//! Handles all job-related CLI commands: viewing a job, updating its state
//! and failure details, and moving attachments in and out.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use deepstyle_client::{CouchStore, DEFAULT_CONTENT_TYPE, DocumentStore, JobClient};
use deepstyle_core::domain::document::VersionedDocument;
use deepstyle_core::domain::job::{JobDocument, JobState};
use tracing::debug;

use crate::config::Config;

/// Job subcommands
#[derive(Subcommand)]
pub enum JobCommands {
    /// Show a job document
    Show {
        /// Job document ID
        id: String,
    },
    /// Set the processing state of a job
    SetState {
        /// Job document ID
        id: String,

        /// New state (e.g. READY_TO_PROCESS)
        state: JobState,

        /// Refuse transitions outside the processing workflow
        #[arg(long)]
        checked: bool,
    },
    /// Record an error message on a job
    SetError {
        /// Job document ID
        id: String,

        message: String,
    },
    /// Record the worker output of a job from a file
    SetOutput {
        /// Job document ID
        id: String,

        /// File holding the combined stdout/stderr
        file: PathBuf,
    },
    /// Attach a file to a job
    Attach {
        /// Job document ID
        id: String,

        /// Attachment name
        name: String,

        file: PathBuf,

        #[arg(long, default_value = DEFAULT_CONTENT_TYPE)]
        content_type: String,
    },
    /// Download one of a job's attachments
    FetchAttachment {
        /// Job document ID
        id: String,

        /// Attachment name
        name: String,

        /// Where to write the attachment
        out: PathBuf,
    },
}

/// Handle job commands
pub async fn handle_job_command(command: JobCommands, config: &Config) -> Result<()> {
    let store_config = config.store_config()?;
    let store = CouchStore::from_config(&store_config).context("Failed to build store client")?;
    let jobs = JobClient::with_policy(store, store_config.retry_policy());
    debug!("Using job database {}", jobs.store().base_url());

    match command {
        JobCommands::Show { id } => show_job(&jobs, &id).await,
        JobCommands::SetState { id, state, checked } => {
            set_state(&jobs, &id, state, checked).await
        }
        JobCommands::SetError { id, message } => set_error(&jobs, &id, &message).await,
        JobCommands::SetOutput { id, file } => set_output(&jobs, &id, &file).await,
        JobCommands::Attach {
            id,
            name,
            file,
            content_type,
        } => attach(&jobs, &id, &name, &file, &content_type).await,
        JobCommands::FetchAttachment { id, name, out } => {
            fetch_attachment(&jobs, &id, &name, &out).await
        }
    }
}

async fn load(jobs: &JobClient<CouchStore>, id: &str) -> Result<JobDocument> {
    let job = jobs
        .load(id)
        .await
        .with_context(|| format!("Failed to load job {}", id))?;

    if !job.is_job() {
        anyhow::bail!("Document {} is not a job", id);
    }
    Ok(job)
}

async fn show_job(jobs: &JobClient<CouchStore>, id: &str) -> Result<()> {
    let job = load(jobs, id).await?;
    print_job_details(&job);
    Ok(())
}

async fn set_state(
    jobs: &JobClient<CouchStore>,
    id: &str,
    state: JobState,
    checked: bool,
) -> Result<()> {
    let mut job = load(jobs, id).await?;
    let previous = job.state();

    let updated = if checked {
        jobs.transition_state(&mut job, state).await
    } else {
        jobs.update_state(&mut job, state).await
    }
    .with_context(|| format!("Failed to set state of job {}", id))?;

    if updated {
        println!(
            "{} Job {}: {} -> {}",
            "✓".green(),
            id.cyan(),
            colorize_state(previous),
            colorize_state(job.state())
        );
    } else {
        println!(
            "{}",
            format!("Job {} is already {}", id, state).yellow()
        );
    }
    Ok(())
}

async fn set_error(jobs: &JobClient<CouchStore>, id: &str, message: &str) -> Result<()> {
    let mut job = load(jobs, id).await?;

    let updated = jobs
        .set_error_message(&mut job, message)
        .await
        .with_context(|| format!("Failed to record error on job {}", id))?;

    report_field(id, "error message", updated);
    Ok(())
}

async fn set_output(jobs: &JobClient<CouchStore>, id: &str, file: &Path) -> Result<()> {
    let output = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let mut job = load(jobs, id).await?;

    let updated = jobs
        .set_std_out_and_err(&mut job, output)
        .await
        .with_context(|| format!("Failed to record output on job {}", id))?;

    report_field(id, "output", updated);
    Ok(())
}

async fn attach(
    jobs: &JobClient<CouchStore>,
    id: &str,
    name: &str,
    file: &Path,
    content_type: &str,
) -> Result<()> {
    let mut job = load(jobs, id).await?;

    jobs.add_attachment(&mut job, name, file, content_type)
        .await
        .with_context(|| format!("Failed to attach {} to job {}", file.display(), id))?;

    println!(
        "{} Attached {} to job {} (revision {})",
        "✓".green(),
        name.cyan(),
        id.cyan(),
        job.revision().dimmed()
    );
    Ok(())
}

async fn fetch_attachment(
    jobs: &JobClient<CouchStore>,
    id: &str,
    name: &str,
    out: &Path,
) -> Result<()> {
    let job = load(jobs, id).await?;

    let body = jobs
        .retrieve_attachment(&job, name)
        .await
        .with_context(|| format!("Failed to fetch attachment {} of job {}", name, id))?;
    tokio::fs::write(out, &body)
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;

    println!(
        "{} Wrote {} ({} bytes) to {}",
        "✓".green(),
        name.cyan(),
        body.len(),
        out.display()
    );
    Ok(())
}

fn report_field(id: &str, field: &str, updated: bool) {
    if updated {
        println!("{} Recorded {} on job {}", "✓".green(), field, id.cyan());
    } else {
        println!(
            "{}",
            format!("Nothing to record: {} is empty or unchanged", field).yellow()
        );
    }
}

/// Print detailed job information
fn print_job_details(job: &JobDocument) {
    println!("{}", "Job Details:".bold());
    println!("  ID:           {}", job.id().cyan());
    println!("  Revision:     {}", job.revision().dimmed());
    println!("  State:        {}", colorize_state(job.state()));
    println!("  Created:      {}", job.created_at());
    println!("  Owner:        {}", job.owner());
    if !job.owner_device_token().is_empty() {
        println!("  Device token: {}", job.owner_device_token().dimmed());
    }

    if !job.attachments().is_empty() {
        println!("\n{}", "Attachments:".bold());
        for (name, meta) in job.attachments() {
            let content_type = meta["content_type"].as_str().unwrap_or("unknown");
            match meta["length"].as_u64() {
                Some(length) => println!(
                    "  {} {} ({}, {} bytes)",
                    "▸".cyan(),
                    name,
                    content_type,
                    length
                ),
                None => println!("  {} {} ({})", "▸".cyan(), name, content_type),
            }
        }
    }

    if !job.extra_fields().is_empty() {
        println!("\n{}", "Fields:".bold());
        for (key, value) in job.extra_fields() {
            println!("  {} = {}", key.cyan(), value);
        }
    }

    if !job.error_message().is_empty() {
        println!("\n{}", "Error:".bold());
        println!("{}", job.error_message().red());
    }

    if !job.std_out_and_err().is_empty() {
        println!("\n{}", "Output:".bold());
        println!("{}", "─".repeat(80).dimmed());
        print!("{}", job.std_out_and_err());
        if !job.std_out_and_err().ends_with('\n') {
            println!();
        }
        println!("{}", "─".repeat(80).dimmed());
    }
}

/// Colorize job state for display
fn colorize_state(state: JobState) -> ColoredString {
    let label = state.as_str();
    match state {
        JobState::NotReadyToProcess => label.dimmed(),
        JobState::ReadyToProcess => label.yellow(),
        JobState::BeingProcessed => label.cyan(),
        JobState::ProcessingSuccessful => label.green(),
        JobState::ProcessingFailed => label.red(),
    }
}
