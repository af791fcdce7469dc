//! Command line definition

use clap::{value_parser, Arg, ArgAction, Command};
use registrar_tracking::Stage;
use std::path::PathBuf;

fn stage_arg(required: bool) -> Arg {
    Arg::new("stage")
        .long("stage")
        .required(required)
        .value_parser(|s: &str| s.parse::<Stage>())
        .help("Registry stage: None, Staging, Production or Archived")
}

fn model_name_arg(required: bool) -> Arg {
    Arg::new("model-name")
        .long("model-name")
        .required(required)
        .help("Registered model name")
}

pub(crate) fn command() -> Command {
    Command::new("registrar")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Register trained models with an MLflow tracking server and stage them")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML config file; environment variables override it"),
        )
        .arg(
            Arg::new("env-file")
                .long("env-file")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Dotenv file (defaults to the nearest .env, if any)"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .default_value("text")
                .value_parser(["text", "json"])
                .help("Log output format"),
        )
        .subcommand(
            Command::new("register")
                .about("Register the model from its run, falling back to the saved file")
                .arg(model_name_arg(false))
                .arg(stage_arg(false))
                .arg(
                    Arg::new("experiment-info")
                        .long("experiment-info")
                        .value_parser(value_parser!(PathBuf))
                        .help("Experiment record written by training"),
                )
                .arg(
                    Arg::new("model-file")
                        .long("model-file")
                        .value_parser(value_parser!(PathBuf))
                        .help("Saved model used when the run cannot be registered"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .value_parser(value_parser!(PathBuf))
                        .help("Where to write the registration record"),
                ),
        )
        .subcommand(
            Command::new("inspect")
                .about("List a run's artifacts to diagnose a wrong model_path")
                .arg(
                    Arg::new("run-id")
                        .long("run-id")
                        .help("Run to inspect (defaults to the one in the experiment record)"),
                )
                .arg(
                    Arg::new("experiment-info")
                        .long("experiment-info")
                        .value_parser(value_parser!(PathBuf))
                        .help("Experiment record to read the run id from"),
                ),
        )
        .subcommand(
            Command::new("promote")
                .about("Move an existing model version to a stage")
                .arg(model_name_arg(true))
                .arg(
                    Arg::new("version")
                        .long("version")
                        .required(true)
                        .help("Model version to move"),
                )
                .arg(stage_arg(true))
                .arg(
                    Arg::new("archive-existing")
                        .long("archive-existing")
                        .action(ArgAction::SetTrue)
                        .help("Archive versions already in the target stage"),
                ),
        )
        .subcommand(
            Command::new("latest")
                .about("Print the highest version of a registered model")
                .arg(model_name_arg(false)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_is_well_formed() {
        command().debug_assert();
    }

    #[test]
    fn parses_register_overrides() {
        let matches = command()
            .try_get_matches_from([
                "registrar",
                "register",
                "--stage",
                "production",
                "--model-name",
                "churn",
                "--log-format",
                "json",
            ])
            .unwrap();
        assert_eq!(matches.get_one::<String>("log-format").unwrap(), "json");
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "register");
        assert_eq!(sub.get_one::<Stage>("stage"), Some(&Stage::Production));
        assert_eq!(sub.get_one::<String>("model-name").unwrap(), "churn");
    }

    #[test]
    fn env_file_is_global() {
        let matches = command()
            .try_get_matches_from(["registrar", "latest", "--env-file", "ci.env"])
            .unwrap();
        assert_eq!(
            matches.get_one::<PathBuf>("env-file"),
            Some(&PathBuf::from("ci.env"))
        );
    }

    #[test]
    fn rejects_unknown_stage() {
        let result = command().try_get_matches_from([
            "registrar",
            "promote",
            "--model-name",
            "m",
            "--version",
            "1",
            "--stage",
            "qa",
        ]);
        assert!(result.is_err());
    }
}
