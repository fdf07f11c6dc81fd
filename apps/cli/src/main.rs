// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CADHY channel builder.
//!
//! Runs the job file named by `CADHY_JOB` (or the first argument) and
//! writes the JSON report to `CADHY_OUTPUT`, or stdout when unset.
//! Exits with status 2 when a produced mesh fails validation.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context};
use cadhy_processing::{run_job, ChannelJob};
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

fn main() -> anyhow::Result<()> {
    // Initialize logging on stderr so stdout stays clean for the report
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,cadhy_processing=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env();
    let job_path = match std::env::args_os().nth(1).map(PathBuf::from).or(config.job.clone()) {
        Some(path) => path,
        None => bail!("no job file: set CADHY_JOB or pass a path"),
    };

    tracing::info!(
        job = %job_path.display(),
        worker_threads = config.worker_threads,
        include_mesh = config.include_mesh,
        "Starting CADHY build"
    );

    rayon::ThreadPoolBuilder::new()
        .num_threads(config.worker_threads)
        .build_global()
        .context("failed to initialize rayon thread pool")?;

    let mut job = ChannelJob::from_file(&job_path)
        .with_context(|| format!("failed to load job {}", job_path.display()))?;
    if let Some(check) = config.check_intersections {
        job.validation.check_self_intersections = check;
    }

    let report = run_job(&job, config.include_mesh, |stage| {
        tracing::info!(progress = stage.progress(), "{}", stage.label());
    })?;

    let json = serde_json::to_string_pretty(&report)?;
    match &config.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write report {}", path.display()))?;
            tracing::info!(output = %path.display(), "Report written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(json.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }

    if !report.is_valid() {
        tracing::warn!(
            errors = ?report.structure.validation.errors,
            "mesh failed validation"
        );
        std::process::exit(2);
    }
    Ok(())
}
