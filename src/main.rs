//! Command line front end: analyse images and inspect model state, printing JSON.

use std::path::PathBuf;

use prostascan::config::{self, ServiceConfig};
use prostascan::logging::{self, LogTarget};
use prostascan::pipeline::Pipeline;
use serde_json::json;

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}

enum Command {
    Analyze {
        images: Vec<PathBuf>,
        release_after: bool,
    },
    Status,
    Health,
    Release,
}

struct Options {
    command: Command,
    config_path: Option<PathBuf>,
    log_to_file: bool,
}

/// Returns `Ok(false)` when at least one request failed.
fn run() -> Result<bool, String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    let target = if options.log_to_file {
        LogTarget::ConsoleAndFile
    } else {
        LogTarget::Console
    };
    if let Err(err) = logging::init(target) {
        eprintln!("Logging disabled: {err}");
    }
    let config = load_config(options.config_path.as_ref())?;
    let pipeline = Pipeline::from_config(&config).map_err(|err| err.to_string())?;

    match options.command {
        Command::Analyze {
            images,
            release_after,
        } => {
            let mut all_ok = true;
            let mut results = Vec::with_capacity(images.len());
            for image in &images {
                match pipeline.analyze(image) {
                    Ok(report) => results.push(json!({
                        "image": image.display().to_string(),
                        "report": report,
                    })),
                    Err(err) => {
                        all_ok = false;
                        results.push(json!({
                            "image": image.display().to_string(),
                            "error": err.to_string(),
                            "status": err.http_status(),
                            "retryable": err.is_retryable(),
                        }));
                    }
                }
            }
            if release_after {
                pipeline.release_models();
            }
            print_json(&results)?;
            Ok(all_ok)
        }
        Command::Status => {
            print_json(&pipeline.status())?;
            Ok(true)
        }
        Command::Health => {
            print_json(&pipeline.health())?;
            Ok(true)
        }
        Command::Release => {
            let summary = pipeline.release_models();
            print_json(&json!({
                "status": "success",
                "released": summary.released,
                "stillInUse": summary.still_in_use,
            }))?;
            Ok(true)
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<ServiceConfig, String> {
    match path {
        Some(path) => config::load_from_path(path),
        None => config::load_or_default(),
    }
    .map_err(|err| err.to_string())
}

fn print_json(value: &impl serde::Serialize) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|err| err.to_string())?;
    println!("{text}");
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<Options, String> {
    if args.is_empty() {
        return Err(help_text());
    }
    let mut config_path = None;
    let mut log_to_file = false;
    let mut release_after = false;
    let mut positional = Vec::new();
    let mut idx = 1usize;
    let command = args[0].as_str();

    while idx < args.len() {
        match args[idx].as_str() {
            "--config" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--config requires a value".to_string())?;
                config_path = Some(PathBuf::from(value));
            }
            "--log-file" => log_to_file = true,
            "--release-after" if command == "analyze" => release_after = true,
            "-h" | "--help" => return Err(help_text()),
            flag if flag.starts_with("--") => {
                return Err(format!("Unknown argument: {flag}\n\n{}", help_text()));
            }
            value => positional.push(PathBuf::from(value)),
        }
        idx += 1;
    }

    let command = match command {
        "analyze" => {
            if positional.is_empty() {
                return Err("analyze requires at least one image path".to_string());
            }
            Command::Analyze {
                images: positional,
                release_after,
            }
        }
        "status" | "health" | "release" if !positional.is_empty() => {
            return Err(format!("{command} takes no arguments\n\n{}", help_text()));
        }
        "status" => Command::Status,
        "health" => Command::Health,
        "release" => Command::Release,
        "-h" | "--help" => return Err(help_text()),
        unknown => return Err(format!("Unknown command: {unknown}\n\n{}", help_text())),
    };
    Ok(Options {
        command,
        config_path,
        log_to_file,
    })
}

fn help_text() -> String {
    [
        "prostascan",
        "",
        "Usage:",
        "  prostascan analyze <image>... [--release-after]",
        "  prostascan status",
        "  prostascan health",
        "  prostascan release",
        "",
        "Models are held in process memory and loaded on first use. `status` and",
        "`release` describe this process only, so a fresh invocation always starts",
        "unloaded; use `analyze --release-after` to unload once a batch is done.",
        "",
        "Options:",
        "  --config <config.toml>  Use an explicit config file",
        "  --log-file              Also write logs under the app directory",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn analyze_collects_images_and_flags() {
        let options = parse_args(args(&[
            "analyze",
            "a.png",
            "--release-after",
            "b.jpg",
            "--config",
            "cfg.toml",
        ]))
        .unwrap();
        assert_eq!(options.config_path, Some(PathBuf::from("cfg.toml")));
        match options.command {
            Command::Analyze {
                images,
                release_after,
            } => {
                assert_eq!(images, vec![PathBuf::from("a.png"), PathBuf::from("b.jpg")]);
                assert!(release_after);
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn rejects_bad_invocations() {
        assert!(parse_args(vec![]).is_err());
        assert!(parse_args(args(&["analyze"])).is_err());
        assert!(parse_args(args(&["status", "extra"])).is_err());
        assert!(parse_args(args(&["status", "--release-after"])).is_err());
        assert!(parse_args(args(&["frobnicate"])).is_err());
        assert!(parse_args(args(&["analyze", "a.png", "--config"])).is_err());
    }

    #[test]
    fn inspection_commands_parse() {
        assert!(matches!(
            parse_args(args(&["health", "--log-file"])).unwrap().command,
            Command::Health
        ));
        assert!(matches!(
            parse_args(args(&["release"])).unwrap().command,
            Command::Release
        ));
    }

    #[test]
    fn help_explains_that_model_state_is_per_process() {
        let help = parse_args(args(&["--help"])).err().unwrap();
        assert!(help.contains("describe this process only"));
        assert!(help.contains("analyze --release-after"));
    }
}
