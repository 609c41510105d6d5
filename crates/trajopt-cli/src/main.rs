use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs;
use std::io;
use std::path::Path;
use std::process::ExitCode;
use tracing::{info, warn};
use trajopt_algo::models::BUILTIN_MODELS;
use trajopt_algo::solver::{property_doc, PropertyDoc, PROPERTIES};
use trajopt_cli::{Cli, Commands, Setup};

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(cli.log_level.into()),
        )
        .with_writer(io::stderr)
        .init();

    match run(&cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: &Commands) -> Result<()> {
    match command {
        Commands::PrintSetup { out } => print_setup(out.as_deref()),
        Commands::Solve { setup, out } => solve(setup, out.as_deref()),
        Commands::PropertyInfo { name } => property_info(name.as_deref()),
        Commands::Models => {
            for name in BUILTIN_MODELS {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn print_setup(out: Option<&Path>) -> Result<()> {
    let text = Setup::default().to_toml()?;
    match out {
        Some(path) => {
            fs::write(path, text)
                .with_context(|| format!("writing setup to '{}'", path.display()))?;
            info!("wrote default setup to {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn solve(setup_path: &Path, out: Option<&Path>) -> Result<()> {
    let setup = Setup::load(setup_path)?;
    info!(model = %setup.model, setup = %setup_path.display(), "loaded setup");

    let solver = setup.build_solver()?;
    let solution = solver.solve().context("solve failed")?;
    if !solution.is_success() {
        warn!(status = %solution.status, "solution did not converge");
    }

    if let Some(path) = out {
        solution
            .trajectory
            .write_csv(path)
            .with_context(|| format!("writing solution to '{}'", path.display()))?;
        info!("wrote solution trajectory to {}", path.display());
    }

    let summary = serde_json::to_string_pretty(&solution.summary())
        .context("serializing solution summary")?;
    println!("{summary}");
    Ok(())
}

fn property_info(name: Option<&str>) -> Result<()> {
    let print = |doc: &PropertyDoc| {
        println!("{} (default: {})", doc.name, doc.default);
        println!("    {}", doc.description);
    };
    match name {
        Some(name) => match property_doc(name) {
            Some(doc) => print(doc),
            None => bail!(
                "no setting named '{name}' (see `trajopt property-info` for the full list)"
            ),
        },
        None => PROPERTIES.iter().for_each(print),
    }
    Ok(())
}
