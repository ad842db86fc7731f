use anyhow::{anyhow, bail, Context};
use colored::Colorize;

use ocfl_jobs::{IdOutcome, JobRecord, JobState};
use ocfl_server::{OcflIndexServer, ServerConfig};

use crate::cli::{Cli, Command, IndexArgs, ServeArgs, StoreArgs};

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = load_config(&cli)?;
    match cli.command {
        Command::Serve(args) => cmd_serve(&mut config, args).await,
        Command::Index(args) => cmd_index(&mut config, args).await,
        Command::Status(args) => cmd_status(&mut config, &args),
        Command::Version => {
            println!("ocfl-index {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Config file, then `OCFL_INDEX_*` variables. Flags are applied per command.
fn load_config(cli: &Cli) -> anyhow::Result<ServerConfig> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ServerConfig::default(),
    };
    config.apply_env().context("reading environment")?;
    Ok(config)
}

fn apply_store_args(config: &mut ServerConfig, args: &StoreArgs) {
    if let Some(root) = &args.root {
        config.storage_root = root.clone();
    }
    if args.memory {
        config.index_file = None;
    } else if let Some(file) = &args.index_file {
        config.index_file = Some(file.clone());
    }
    if let Some(n) = args.concurrency {
        config.parse_concurrency = n;
    }
    if args.read_sizes {
        config.read_sizes = true;
    }
}

async fn cmd_serve(config: &mut ServerConfig, args: ServeArgs) -> anyhow::Result<()> {
    apply_store_args(config, &args.store);
    if let Some(bind) = &args.bind {
        config.bind_addr = ocfl_server::config::parse_listen(bind)?;
    }
    if args.index {
        config.index_on_start = true;
    }
    OcflIndexServer::new(config.clone())
        .serve(shutdown_signal())
        .await?;
    Ok(())
}

async fn cmd_index(config: &mut ServerConfig, args: IndexArgs) -> anyhow::Result<()> {
    apply_store_args(config, &args.store);
    let server = OcflIndexServer::new(config.clone());
    let state = server.build_state()?;
    let jobs = &state.jobs;

    let result = if args.ids.is_empty() {
        jobs.start_index_all()?;
        match jobs.wait_index_all().await {
            Some(job) => print_job(&job),
            None => Err(anyhow!("index job did not start")),
        }
    } else {
        let results = jobs.index_ids(args.ids).await?;
        let mut failed = 0;
        for r in &results {
            let mark = match &r.outcome {
                IdOutcome::Indexed => "indexed".green(),
                IdOutcome::Unchanged => "unchanged".dimmed(),
                IdOutcome::Removed => "removed".yellow(),
                IdOutcome::NotFound => "not found".yellow(),
                IdOutcome::Failed(_) => {
                    failed += 1;
                    "failed".red().bold()
                }
            };
            match &r.outcome {
                IdOutcome::Failed(msg) => println!("{:>10}  {}: {}", mark, r.id, msg),
                _ => println!("{:>10}  {}", mark, r.id),
            }
        }
        if failed > 0 {
            Err(anyhow!("{failed} of {} objects failed", results.len()))
        } else {
            Ok(())
        }
    };

    jobs.shutdown().await;
    result
}

fn print_job(job: &JobRecord) -> anyhow::Result<()> {
    let c = job.counters;
    let elapsed = match (job.started_at, job.ended_at) {
        (Some(start), Some(end)) => {
            format!(" in {:.1}s", (end - start).num_milliseconds() as f64 / 1000.0)
        }
        _ => String::new(),
    };
    for err in &job.errors {
        println!("{}  {}: {}", "✗".red(), err.target, err.message);
    }
    match job.state {
        JobState::Completed => {
            println!(
                "{} Indexed {} objects{}: {} updated, {} unchanged, {} removed, {} failed",
                "✓".green().bold(),
                c.found,
                elapsed,
                c.indexed,
                c.unchanged,
                c.removed,
                c.failed,
            );
            Ok(())
        }
        _ => bail!(
            "index job {}: {}",
            job.state,
            job.failure.as_deref().unwrap_or("no reason given")
        ),
    }
}

fn cmd_status(config: &mut ServerConfig, args: &StoreArgs) -> anyhow::Result<()> {
    apply_store_args(config, args);
    let state = OcflIndexServer::new(config.clone()).build_state()?;
    let summary = state.query.summary()?;
    println!("{}  {}", "root:".bold(), summary.root_path);
    match &summary.spec {
        Some(spec) => println!("{}  OCFL {}", "spec:".bold(), spec),
        None => println!("{}  {}", "spec:".bold(), "not indexed".dimmed()),
    }
    if !summary.description.is_empty() {
        println!("{}  {}", "desc:".bold(), summary.description);
    }
    println!("{}  {}", "objects:".bold(), summary.object_count);
    match summary.indexed_at {
        Some(at) => println!("{}  {}", "indexed:".bold(), at.to_rfc3339()),
        None => println!("{}  {}", "indexed:".bold(), "never".dimmed()),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn store_flags_override_config() {
        let mut config = ServerConfig::default();
        apply_store_args(
            &mut config,
            &StoreArgs {
                root: Some(PathBuf::from("/srv/ocfl")),
                memory: true,
                concurrency: Some(2),
                ..StoreArgs::default()
            },
        );
        assert_eq!(config.storage_root, PathBuf::from("/srv/ocfl"));
        assert_eq!(config.index_file, None);
        assert_eq!(config.parse_concurrency, 2);
        assert!(!config.read_sizes);
    }

    #[test]
    fn unset_flags_keep_config() {
        let mut config = ServerConfig {
            index_file: Some(PathBuf::from("idx.log")),
            ..ServerConfig::default()
        };
        apply_store_args(&mut config, &StoreArgs::default());
        assert_eq!(config.index_file, Some(PathBuf::from("idx.log")));
    }
}
