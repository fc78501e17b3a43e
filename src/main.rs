mod cli;
mod ui;

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use formicary::job::Job;
use formicary::nest::Nest;
use formicary::pack;
use formicary::{Environment, LogLevel, Options};
use ui::TaskProgress;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut options = match &cli.config {
        Some(path) => Options::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Options::load()?,
    };
    if cli.verbose {
        options.log_level = LogLevel::Debug;
    }
    init_tracing(options.log_level);

    let env = Environment::new(options);
    match cli.command {
        Command::Pack { path, out } => pack_path(&env, &path, out.as_deref()).await,
        Command::Unpack { archive, out } => unpack_archive(&env, &archive, out.as_deref()).await,
        Command::Inspect { archive } => {
            let ticket = pack::read_ticket(&archive)
                .with_context(|| format!("reading ticket of {}", archive.display()))?;
            ui::print_ticket(&ticket);
            Ok(())
        }
    }
}

fn init_tracing(level: LogLevel) {
    let default = match level {
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warning => "warn",
        LogLevel::Error => "error",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn pack_path(env: &Environment, path: &Path, out: Option<&Path>) -> anyhow::Result<()> {
    let job = if path.is_dir() {
        Job::folder(path)?
    } else {
        Job::file(path)
    };

    let progress = TaskProgress::start(&format!("Packing {}", path.display()));
    let packer = env.packer();
    let packed = tokio::task::spawn_blocking(move || packer.pack(&job)).await?;
    let mut packed = match packed {
        Ok(packed) => packed,
        Err(err) => {
            progress.fail(&err.to_string());
            return Err(err.into());
        }
    };

    if let Some(out) = out {
        deliver_to(env, out, &mut packed).await?;
    }
    progress.succeed(&format!("Packed {}", packed.name()));
    progress.print_job(&packed);
    Ok(())
}

async fn unpack_archive(env: &Environment, archive: &Path, out: Option<&Path>) -> anyhow::Result<()> {
    let progress = TaskProgress::start(&format!("Unpacking {}", archive.display()));
    let packer = env.packer();
    let source = Job::file(archive);
    let unpacked = tokio::task::spawn_blocking(move || packer.unpack(&source)).await?;
    let mut job = match unpacked {
        Ok(job) => job,
        Err(err) => {
            progress.fail(&err.to_string());
            return Err(err.into());
        }
    };

    if let Some(out) = out
        && job.path().is_some()
    {
        deliver_to(env, out, &mut job).await?;
    }
    progress.succeed(&format!("Unpacked {} ({} events)", job.name(), job.life_cycle().len()));
    progress.print_job(&job);
    Ok(())
}

/// Moves the job's backing asset into `out` through a folder nest.
async fn deliver_to(env: &Environment, out: &Path, job: &mut Job) -> anyhow::Result<()> {
    std::fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
    let name = job.name().to_owned();
    let nest = env.folder_nest(out);
    nest.take(job)
        .await
        .with_context(|| format!("moving {name} into {}", out.display()))?;
    Ok(())
}
