//! Offline audit of an already downloaded configuration export.
//!
//! Decrypts the bundle (or reads an extracted tree), checks every device's
//! SNMP host statements and prints the remediation template that a full
//! run would create. The controller is never contacted.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example audit -- --bundle Export_Configs.zip --passphrase 'secret!' \
//!     --endpoint 10.0.0.2 --group public \
//!     --directive 'snmp-server host 10.0.0.2 version 2c public'
//! ```
//!
//! Against a directory that was already extracted:
//! ```bash
//! cargo run --example audit -- --extracted ./configfiles --endpoint 10.0.0.2 --group public
//! ```

use std::env;
use std::path::PathBuf;

use secrecy::SecretString;

use snmpfix::{
    ArchiveExtractor, BundleLocator, ComplianceOutcome, ComplianceRule, ConfigValidator,
    DeviceRecord, ExtractedRoot, Inventory, synthesize,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();

    let root = match &args.source {
        Source::Extracted(dir) => ExtractedRoot::new(dir),
        Source::Bundle(locator) => {
            let Some(passphrase) = args.passphrase.clone() else {
                eprintln!("Error: --passphrase is required to open a bundle");
                std::process::exit(1);
            };
            let passphrase = SecretString::from(passphrase);
            println!("Extracting into {}...", args.out.display());
            ArchiveExtractor::new(&args.out)
                .replacing()
                .extract(locator, &passphrase)?
        }
    };

    let validator = ConfigValidator::new(ComplianceRule::snmp_host(&args.endpoint, &args.group));

    // Device directories are named by management address.
    let mut inventory: Inventory = root
        .devices()?
        .into_iter()
        .map(|address| DeviceRecord::new(address.clone(), address))
        .collect();

    println!("Auditing {} devices", inventory.len());
    println!("{}", "-".repeat(50));

    let addresses: Vec<String> = inventory.addresses().map(str::to_string).collect();
    for address in &addresses {
        let outcome = match validator.validate(address, &root) {
            Ok(outcome) => outcome,
            Err(e) => {
                println!("{:<18} ERROR       {}", address, e);
                continue;
            }
        };

        match &outcome {
            ComplianceOutcome::Compliant { checked } => {
                println!("{:<18} compliant   ({} lines checked)", address, checked)
            }
            ComplianceOutcome::NonCompliant { lines, checked } => {
                println!(
                    "{:<18} DRIFT       ({} of {} lines)",
                    address,
                    lines.len(),
                    checked
                );
                for line in lines {
                    println!("{:<18}   {}", "", line);
                }
            }
            ComplianceOutcome::NoMatchingConfig => {
                println!("{:<18} no match    (no '{}' lines)", address, validator.rule().keyword)
            }
        }
        inventory.record_compliance(address, outcome);
    }

    println!("{}", "-".repeat(50));
    let flagged = inventory.non_compliant().count();
    println!("{} of {} devices need remediation", flagged, inventory.len());

    if let Some(directive) = &args.directive {
        println!("\nRemediation template:\n");
        println!("{}", synthesize(&inventory, directive));
    }

    Ok(())
}

enum Source {
    Bundle(BundleLocator),
    Extracted(PathBuf),
}

/// Simple argument parser (avoiding external dependencies)
struct Args {
    source: Source,
    passphrase: Option<String>,
    out: PathBuf,
    endpoint: String,
    group: String,
    directive: Option<String>,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut source = Source::Bundle(BundleLocator::export_in("."));
        let mut passphrase = None;
        let mut out = PathBuf::from("configfiles");
        let mut endpoint = None;
        let mut group = None;
        let mut directive = None;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--bundle" | "-b" => {
                    i += 1;
                    if i < args.len() {
                        source = Source::Bundle(BundleLocator::Path(PathBuf::from(&args[i])));
                    }
                }
                "--scan" | "-s" => {
                    i += 1;
                    if i < args.len() {
                        source = Source::Bundle(BundleLocator::export_in(&args[i]));
                    }
                }
                "--extracted" | "-x" => {
                    i += 1;
                    if i < args.len() {
                        source = Source::Extracted(PathBuf::from(&args[i]));
                    }
                }
                "--passphrase" | "-P" => {
                    i += 1;
                    if i < args.len() {
                        passphrase = Some(args[i].clone());
                    }
                }
                "--out" | "-o" => {
                    i += 1;
                    if i < args.len() {
                        out = PathBuf::from(&args[i]);
                    }
                }
                "--endpoint" | "-e" => {
                    i += 1;
                    if i < args.len() {
                        endpoint = Some(args[i].clone());
                    }
                }
                "--group" | "-g" => {
                    i += 1;
                    if i < args.len() {
                        group = Some(args[i].clone());
                    }
                }
                "--directive" | "-d" => {
                    i += 1;
                    if i < args.len() {
                        directive = Some(args[i].clone());
                    }
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

        let (Some(endpoint), Some(group)) = (endpoint, group) else {
            eprintln!("Error: --endpoint and --group are required");
            std::process::exit(1);
        };

        Self {
            source,
            passphrase,
            out,
            endpoint,
            group,
            directive,
        }
    }

    fn print_help() {
        println!(
            r#"snmpfix audit example

USAGE:
    cargo run --example audit -- [SOURCE] [OPTIONS]

SOURCE (default: scan the current directory for an Export_Configs bundle):
    -b, --bundle <PATH>        Encrypted export bundle
    -s, --scan <DIR>           Directory holding exactly one Export_Configs bundle
    -x, --extracted <DIR>      Already extracted tree, one directory per device

OPTIONS:
    -P, --passphrase <PASS>    Bundle passphrase (required for bundles)
    -o, --out <DIR>            Extraction directory, cleared first [default: configfiles]
    -e, --endpoint <ADDR>      Expected SNMP host (required)
    -g, --group <NAME>         Expected SNMP community (required)
    -d, --directive <LINE>     Corrected line; prints the remediation template
    -h, --help                 Print this help message
"#
        );
    }
}
