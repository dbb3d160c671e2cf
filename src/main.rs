mod cli;
mod ui;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::{Cli, Command};
use jobset_core::{
    BulkHandler, BulkOutput, HandlerRegistry, InvocationContext, JobHandler, JobStatus,
    JobsetValidator, SchemaStore, Settings, init_tracing,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load("jobset")?;
    if let Some(max_attempts) = cli.max_attempts {
        settings = settings.with_max_attempts(max_attempts);
    }
    if cli.verbose {
        settings.log_level = tracing::level_filters::LevelFilter::DEBUG;
    }
    init_tracing(&settings);

    match cli.command {
        Command::Run { event, fail, bulk } => {
            let raw = std::fs::read_to_string(&event)
                .with_context(|| format!("reading {}", event.display()))?;
            let event: serde_json::Value = serde_json::from_str(&raw)?;
            let failing: HashSet<String> = fail.into_iter().collect();

            let registry = HandlerRegistry::with_builtin_schema(Arc::new(settings))?;
            let entry = if bulk {
                registry.register_bulk_handler(demo_bulk_handler(failing))?
            } else {
                registry.register_job_handler(demo_job_handler(failing))?
            };

            let progress = ui::InvocationProgress::start("Processing jobs");
            let output = entry.invoke(event, &InvocationContext::default()).await;
            progress.finish(output.as_ref());

            match output {
                Some(jobset) => println!("{}", serde_json::to_string_pretty(&jobset)?),
                None => println!("null"),
            }
        }
        Command::Validate { file, schema_dir } => {
            let mut store = SchemaStore::builtin()?;
            if let Some(dir) = schema_dir {
                store.load_dir(&dir)?;
            }
            let validator = store.compile("jobset")?;
            let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&file)?)?;
            match validator.validate(&raw) {
                Ok(jobset) => println!("valid jobset with {} jobs", jobset.len()),
                Err(e) => bail!("invalid jobset: {e}"),
            }
        }
    }

    Ok(())
}

fn demo_job_handler(failing: HashSet<String>) -> JobHandler {
    JobHandler::with_logger(move |job, logger| {
        if failing.contains(&job.product_id) {
            bail!("simulated failure for {}", job.product_id);
        }
        logger.info("completed");
        Ok(job.with_status(JobStatus::Completed))
    })
}

fn demo_bulk_handler(failing: HashSet<String>) -> BulkHandler {
    BulkHandler::new(move |jobs| {
        let jobs = jobs
            .into_iter()
            .map(|job| {
                if failing.contains(&job.product_id) {
                    job.to_terminal_failure("simulated bulk failure")
                } else {
                    job.with_status(JobStatus::Completed)
                }
            })
            .collect();
        Ok(BulkOutput::Jobs(jobs))
    })
}
