mod cli;

use anyhow::Context;
use clap::ArgMatches;
use registrar_core::{inspect_run_artifacts, load_model_info, Registrar, RegistrarConfig};
use registrar_tracking::Stage;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli::command().get_matches();

    let json = matches
        .get_one::<String>("log-format")
        .is_some_and(|f| f == "json");
    init_tracing(json);

    match run(&matches).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "registrar=info".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<RegistrarConfig> {
    let path = matches.get_one::<PathBuf>("config").map(PathBuf::as_path);
    let env_file = matches.get_one::<PathBuf>("env-file").map(PathBuf::as_path);
    let config = RegistrarConfig::load_with_env_file(path, env_file)
        .context("loading configuration")?;
    tracing::debug!(?config, "configuration loaded");
    Ok(config)
}

fn registrar(config: RegistrarConfig) -> anyhow::Result<Registrar> {
    let client = config.connect()?;
    Ok(Registrar::new(Arc::new(client), config))
}

async fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let mut config = load_config(matches)?;

    match matches.subcommand() {
        Some(("register", args)) => {
            if let Some(name) = args.get_one::<String>("model-name") {
                config.model_name.clone_from(name);
            }
            if let Some(stage) = args.get_one::<Stage>("stage") {
                config.target_stage = *stage;
            }
            if let Some(path) = args.get_one::<PathBuf>("experiment-info") {
                config.paths.experiment_info.clone_from(path);
            }
            if let Some(path) = args.get_one::<PathBuf>("model-file") {
                config.paths.model_file.clone_from(path);
            }
            if let Some(path) = args.get_one::<PathBuf>("output") {
                config.paths.registered_model_info.clone_from(path);
            }

            let outcome = registrar(config)?.register().await?;
            println!("{outcome}");
            println!("Model transitioned to {} stage.", outcome.stage);
        }
        Some(("inspect", args)) => {
            let run_id = match args.get_one::<String>("run-id") {
                Some(run_id) => run_id.clone(),
                None => {
                    let path = args
                        .get_one::<PathBuf>("experiment-info")
                        .unwrap_or(&config.paths.experiment_info);
                    let info = load_model_info(path).await?;
                    println!("Run ID: {}", info.run_id);
                    println!("Model path: {}", info.model_path);
                    println!();
                    info.run_id
                }
            };

            let client = config.connect()?;
            let report = inspect_run_artifacts(&client, &run_id)
                .await
                .context("Error listing artifacts")?;
            print!("{report}");
        }
        Some(("promote", args)) => {
            let name = args
                .get_one::<String>("model-name")
                .context("--model-name is required")?;
            let version = args
                .get_one::<String>("version")
                .context("--version is required")?;
            let stage = *args
                .get_one::<Stage>("stage")
                .context("--stage is required")?;
            let archive = args.get_flag("archive-existing");

            let staged = registrar(config)?
                .transition(name, version, stage, archive)
                .await?;
            println!(
                "Model '{}' version {} is now in {}.",
                staged.name, staged.version, staged.current_stage
            );
        }
        Some(("latest", args)) => {
            let name = args
                .get_one::<String>("model-name")
                .cloned()
                .unwrap_or_else(|| config.model_name.clone());

            match registrar(config)?.latest_version(&name).await? {
                Some(version) => println!("{version}"),
                None => anyhow::bail!("No versions found for model '{name}'"),
            }
        }
        _ => unreachable!("clap requires a subcommand"),
    }

    Ok(())
}
