//! Config validation CLI tool
//!
//! Validates a focusd configuration file and reports any errors.

use focus_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a focusd configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match focus_config::load_config(&config_path) {
        Ok(config) => {
            let friction = &config.default_friction;
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", focus_config::CURRENT_CONFIG_VERSION);
            println!("  Platform:       {}", config.host.platform);
            println!("  Host app:       {}", config.host.app_id);
            println!("  Enforcement:    {:?}", config.host.enforcement);
            println!(
                "  Deadline timer: {}",
                if config.host.deadline_timer { "on" } else { "off" }
            );
            println!(
                "  Friction:       hold {}s, delay {}s, emergency {}min",
                friction.hold_to_unlock_seconds,
                friction.unlock_delay_seconds,
                friction.emergency_unlock_minutes
            );
            match &config.remote.poll_url {
                Some(url) => println!(
                    "  Remote poll:    {} (timeout {}s)",
                    url,
                    config.remote.poll_timeout.as_secs()
                ),
                None => println!("  Remote poll:    disabled (push only)"),
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                focus_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                focus_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                focus_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                focus_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        focus_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
