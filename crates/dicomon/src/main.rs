//! dicomon: launcher for the external DICOM monitor script.
//!
//! Linear flow, no supervision:
//! resolve install dir → chdir → discover venv → build invocation →
//! spawn detached → record → exit. The launcher's exit code reflects
//! its own preparation steps and the spawn request, never the
//! monitor's eventual outcome.

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use dicomon::config::{MonitorInvocation, MonitorOverrides};
use dicomon::context::LaunchContext;
use dicomon::launch::{self, LaunchRecord};
use dicomon::venv;
use dicomon_logging::{init_logging, LogConfig};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "dicomon", about = "Launcher for the DICOM monitor")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(flatten)]
    opts: CommonOpts,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Debug)]
struct CommonOpts {
    /// Install directory (default: the directory containing this executable)
    #[arg(long, global = true, env = "DICOMON_INSTALL_DIR")]
    install_dir: Option<PathBuf>,

    /// Monitor script to run
    #[arg(long, global = true, env = "DICOMON_SCRIPT")]
    script: Option<PathBuf>,

    /// Settings file passed to the monitor as --settings
    #[arg(long, global = true, env = "DICOMON_SETTINGS")]
    settings: Option<PathBuf>,

    /// Log directory passed to the monitor as --logdir
    #[arg(long, global = true, env = "DICOMON_LOGDIR")]
    logdir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the monitor as a detached background process (default)
    Launch {
        /// Extra arguments forwarded to the monitor after --settings/--logdir
        #[arg(last = true)]
        extra_args: Vec<String>,
    },
    /// Validate the launch context without spawning anything
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(err) = init_logging(LogConfig {
        app_name: "dicomon",
        verbose: cli.verbose,
    }) {
        eprintln!("Warning: failed to initialize logging: {err:#}");
    }

    match cli.command {
        None => run_launch(&cli.opts, &[]),
        Some(Commands::Launch { ref extra_args }) => run_launch(&cli.opts, extra_args),
        Some(Commands::Check) => run_check(&cli.opts),
    }
}

fn resolve_context(opts: &CommonOpts) -> Result<LaunchContext> {
    let ctx = match &opts.install_dir {
        Some(dir) => LaunchContext::from_dir(dir)?,
        None => LaunchContext::resolve()?,
    };
    Ok(ctx)
}

fn overrides_from(opts: &CommonOpts, extra_args: &[String]) -> MonitorOverrides {
    MonitorOverrides {
        script: opts.script.clone(),
        settings: opts.settings.clone(),
        logdir: opts.logdir.clone(),
        extra_args: extra_args.to_vec(),
    }
}

fn run_launch(opts: &CommonOpts, extra_args: &[String]) -> Result<()> {
    let ctx = resolve_context(opts)?;
    ctx.enter()?;

    let env = venv::discover(&ctx.install_dir)?;
    let invocation = MonitorInvocation::resolve(&ctx.install_dir, &overrides_from(opts, extra_args))?;
    invocation.validate()?;

    info!("Launching DICOM monitor");
    info!("  Install dir: {}", ctx.install_dir.display());
    info!("  Interpreter: {}", env.interpreter.display());
    info!("  Settings: {}", invocation.settings.display());
    info!("  Logdir: {}", invocation.logdir.display());

    let child = launch::spawn_monitor(&env, &invocation, &ctx.install_dir)?;
    launch::record_launch(
        &launch::default_history_path(),
        LaunchRecord::new(child, &env, &invocation),
    );

    println!("Started DICOM monitor (pid {})", child.pid);
    Ok(())
}

/// Preflight: report everything the launch would use and fail if any
/// hard requirement is missing. Unlike launch, this also checks the
/// settings file, since the monitor exits immediately without one.
fn run_check(opts: &CommonOpts) -> Result<()> {
    let ctx = resolve_context(opts)?;
    println!("Install dir: {}", ctx.install_dir.display());

    let mut failures = Vec::new();

    match venv::discover(&ctx.install_dir) {
        Ok(env) => {
            println!("Virtual env: {}", env.venv_dir.display());
            println!("Interpreter: {}", env.interpreter.display());
        }
        Err(err) => {
            println!("Virtual env: MISSING");
            if let Some(system) = venv::system_python_hint() {
                println!(
                    "  note: system python at {} exists but is never used",
                    system.display()
                );
            }
            failures.push(err.to_string());
        }
    }

    let invocation = MonitorInvocation::resolve(&ctx.install_dir, &overrides_from(opts, &[]))?;
    match invocation.validate() {
        Ok(()) => println!("Monitor script: {}", invocation.script.display()),
        Err(err) => {
            println!("Monitor script: MISSING ({})", invocation.script.display());
            failures.push(err.to_string());
        }
    }

    if invocation.settings.is_file() {
        println!("Settings file: {}", invocation.settings.display());
    } else {
        println!(
            "Settings file: MISSING ({})",
            invocation.settings.display()
        );
        failures.push(format!(
            "Settings file not found: {}",
            invocation.settings.display()
        ));
    }

    if invocation.logdir.is_dir() {
        println!("Log dir: {}", invocation.logdir.display());
    } else {
        println!(
            "Log dir: {} (created by the monitor on first run)",
            invocation.logdir.display()
        );
    }

    if !failures.is_empty() {
        for failure in &failures {
            eprintln!("error: {}", failure);
        }
        bail!("{} preflight check(s) failed", failures.len());
    }

    println!("OK");
    Ok(())
}
