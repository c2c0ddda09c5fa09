//! Full remediation run against a live controller.
//!
//! Exports the running configuration of every device selected by the config
//! file, checks the SNMP host statements, creates a remediation template and
//! deploys it after confirmation.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example remediate -- --config snmpfix.toml
//! ```
//!
//! Answer every prompt with "yes" (unattended):
//! ```bash
//! cargo run --example remediate -- --config snmpfix.toml --yes
//! ```

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use snmpfix::{
    AutoConfirm, ConfigFile, Confirmation, DeploymentOutcome, HttpController, Remediation,
    RunOutcome,
};

/// Asks on the terminal and reads the answer from stdin.
struct TerminalConfirmation;

impl Confirmation for TerminalConfirmation {
    fn confirm(&self, prompt: &str, default: bool) -> bool {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        print!("{} {}: ", prompt, hint);
        if io::stdout().flush().is_err() {
            return default;
        }

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => default,
            Ok(_) => match line.trim().to_ascii_lowercase().as_str() {
                "" => default,
                "y" | "yes" => true,
                _ => false,
            },
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize logging (set RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let file = match ConfigFile::load(&args.config) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let mut remediation = file.remediation;
    if let Some(work_dir) = args.work_dir {
        remediation.work_dir = work_dir;
    }

    println!("Connecting to {}...", file.controller.url);
    let controller = match HttpController::new(file.controller) {
        Ok(controller) => controller,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, stopping after the current request...");
            on_interrupt.cancel();
        }
    });

    let builder = Remediation::builder(controller)
        .config(remediation)
        .cancellation(cancel);
    let builder = if args.yes {
        builder.confirmation(AutoConfirm::yes())
    } else {
        builder.confirmation(TerminalConfirmation)
    };

    let mut run = match builder.build() {
        Ok(run) => run,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    match run.run().await {
        Ok(outcome) => {
            report(&outcome);
            std::process::exit(outcome.exit_code());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn report(outcome: &RunOutcome) {
    println!("{}", "-".repeat(50));
    match outcome {
        RunOutcome::NoDevices => println!("No devices matched the configured filters."),
        RunOutcome::Declined { stage, template_id } => {
            println!("Stopped at {} prompt.", stage);
            if let Some(id) = template_id {
                println!(
                    "Template {} is committed and can be deployed manually from the controller.",
                    id
                );
            }
        }
        RunOutcome::Deployed {
            template_id,
            outcome,
        } => match outcome {
            DeploymentOutcome::Succeeded(_) => {
                println!("Template {} deployed successfully.", template_id)
            }
            DeploymentOutcome::Failed(status) | DeploymentOutcome::Unrecognized(status) => {
                println!(
                    "Deployment of template {} ended in {}:",
                    template_id, status.status
                );
                println!("{}", status.to_pretty_json());
            }
        },
    }
}

/// Simple argument parser (avoiding external dependencies)
struct Args {
    config: PathBuf,
    work_dir: Option<PathBuf>,
    yes: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut config = PathBuf::from("snmpfix.toml");
        let mut work_dir = None;
        let mut yes = false;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--config" | "-c" => {
                    i += 1;
                    if i < args.len() {
                        config = PathBuf::from(&args[i]);
                    }
                }
                "--work-dir" | "-w" => {
                    i += 1;
                    if i < args.len() {
                        work_dir = Some(PathBuf::from(&args[i]));
                    }
                }
                "--yes" | "-y" => {
                    yes = true;
                }
                "--help" | "-h" => {
                    Self::print_help();
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                }
            }
            i += 1;
        }

        Self {
            config,
            work_dir,
            yes,
        }
    }

    fn print_help() {
        println!(
            r#"snmpfix remediate example

USAGE:
    cargo run --example remediate -- [OPTIONS]

OPTIONS:
    -c, --config <PATH>      TOML config file [default: snmpfix.toml]
    -w, --work-dir <DIR>     Override the working directory from the config
    -y, --yes                Answer yes to every prompt
    -h, --help               Print this help message

EXIT STATUS:
    0    template deployed successfully, or no devices matched
    1    error, failed deployment, or a prompt was declined

EXAMPLES:
    # Interactive run
    cargo run --example remediate -- --config snmpfix.toml

    # Unattended run with a scratch directory
    cargo run --example remediate -- -c snmpfix.toml -w /tmp/snmpfix --yes
"#
        );
    }
}
