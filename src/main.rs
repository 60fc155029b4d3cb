//! CLI for UOV oil-space recovery

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::Serialize;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use uov_recover::attack::{recover, RecoveryConfig, RecoveryReport};
use uov_recover::key::{Parameters, PublicKey};
use uov_recover::math::Vector;
use uov_recover::provider::{
    decode_oil_vector, encode_vector, load_config, load_public_key, public_key_to_json, Layout,
};
use uov_recover::solver::ExhaustiveSolver;
use uov_recover::toy::ToyInstance;
use uov_recover::{RecoveryError, Stage};

#[derive(Parser)]
#[command(name = "uov-recover")]
#[command(about = "UOV oil-space recovery from a single leaked oil vector")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, global = true)]
    json: bool,

    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Log progress to stderr (-v info, -vv debug)"
    )]
    verbose: u8,
}

#[derive(Args)]
struct KeyArgs {
    #[arg(long, default_value = "-", help = "Public key file, or - for stdin")]
    pk: String,

    #[arg(long, help = "Leaked oil vector as hex, or a file containing it")]
    oil: String,

    #[arg(long, help = "Vinegar variables v (text keys default to 68)")]
    vinegar: Option<usize>,

    #[arg(long, help = "Oil variables m (text keys default to 44)")]
    oil_vars: Option<usize>,

    #[arg(long, default_value = "expanded", help = "Text key layout: expanded, flat")]
    layout: String,
}

#[derive(Subcommand)]
enum Command {
    /// Recover the oil space
    Recover {
        #[command(flatten)]
        key: KeyArgs,

        #[arg(long, help = "Master RNG seed")]
        seed: Option<u64>,

        #[arg(long, help = "Kipnis-Shamir attempt budget")]
        ks_attempts: Option<usize>,

        #[arg(long, help = "Reconciliation iteration budget")]
        max_iterations: Option<usize>,

        #[arg(long, help = "Constrained variables the exhaustive solver accepts")]
        solver_variables: Option<usize>,

        #[arg(long, help = "JSON run configuration")]
        config: Option<String>,

        #[arg(long, help = "Draw reconciliation prefixes at random")]
        randomize: bool,

        #[arg(long, help = "Print the basis in reduced row-echelon form")]
        canonical: bool,
    },
    /// Check a leaked oil vector against the public key
    Verify {
        #[command(flatten)]
        key: KeyArgs,
    },
    /// Generate a toy key with a planted oil space (JSON on stdout)
    Generate {
        #[arg(long)]
        vinegar: usize,

        #[arg(long)]
        oil_vars: usize,

        #[arg(long, default_value_t = 0)]
        seed: u64,

        #[arg(long, help = "Write one planted oil vector as hex to this file")]
        oil_out: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Command::Recover {
            key,
            seed,
            ks_attempts,
            max_iterations,
            solver_variables,
            config,
            randomize,
            canonical,
        } => {
            let (pk, oil) = load_inputs(&key)?;

            let mut config = match config {
                Some(path) => load_config(&path)?,
                None => RecoveryConfig::default(),
            };
            if seed.is_some() {
                config.seed = seed;
            }
            if let Some(n) = ks_attempts {
                config.kipnis_shamir.max_attempts = n;
            }
            if let Some(n) = max_iterations {
                config.reconciliation.max_iterations = n;
            }
            if let Some(n) = solver_variables {
                config.solver.max_variables = n;
            }
            if randomize {
                config.reconciliation.randomize = true;
            }
            // Drawn here so that failures can report it too.
            let seed = *config.seed.get_or_insert_with(|| rand::thread_rng().gen());

            let solver = ExhaustiveSolver::new(config.solver);
            let output = match recover(&pk, &oil, &solver, &config) {
                Ok(report) => RecoveryOutput::from_report(&report, canonical),
                Err(e) if is_attack_failure(&e) => RecoveryOutput::from_failure(&pk, seed, &e),
                Err(e) => return Err(e.into()),
            };
            println!("{}", format_output(&output, cli.json)?);
            Ok(output.success)
        }
        Command::Verify { key } => {
            let (pk, oil) = load_inputs(&key)?;
            let output = match pk.check_oil_vector(&oil) {
                Ok(()) => VerifyOutput {
                    valid: true,
                    failing_equation: None,
                },
                Err(RecoveryError::InvalidOilVector { equation }) => VerifyOutput {
                    valid: false,
                    failing_equation: Some(equation),
                },
                Err(e) => return Err(e.into()),
            };
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else if let Some(k) = output.failing_equation {
                println!("Invalid oil vector: public equation {k} does not vanish");
            } else {
                println!("Oil vector verified against {} public equations", pk.params().m);
            }
            Ok(output.valid)
        }
        Command::Generate {
            vinegar,
            oil_vars,
            seed,
            oil_out,
        } => {
            let params = Parameters::new(vinegar, oil_vars)?;
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            let toy = ToyInstance::generate(params, &mut rng)?;
            if let Some(path) = oil_out {
                let oil = toy.random_oil_vector(&mut rng);
                std::fs::write(&path, encode_vector(&oil))
                    .with_context(|| format!("Failed to write {path}"))?;
            }
            println!("{}", public_key_to_json(&toy.key)?);
            Ok(true)
        }
    }
}

fn load_inputs(args: &KeyArgs) -> Result<(PublicKey, Vector)> {
    let params = match (args.vinegar, args.oil_vars) {
        (Some(v), Some(m)) => Some(Parameters::new(v, m)?),
        (None, None) => None,
        _ => bail!("--vinegar and --oil-vars must be given together"),
    };
    let layout = match args.layout.as_str() {
        "expanded" => Layout::Expanded,
        "flat" => Layout::Flat,
        other => bail!("Unknown key layout: {}", other),
    };
    let pk = load_public_key(&args.pk, params, layout)?;
    let oil = decode_oil_vector(&args.oil, pk.params().n)?;
    Ok((pk, oil))
}

/// Errors where the attack ran but could not finish; reported as exit code 1.
fn is_attack_failure(e: &RecoveryError) -> bool {
    e.is_escalation()
        || matches!(
            e,
            RecoveryError::NoSolutionFound { .. }
                | RecoveryError::InvalidOilVector { .. }
                | RecoveryError::SingularCombination { .. }
        )
}

#[derive(Serialize)]
struct RecoveryOutput {
    success: bool,
    status: String,
    reason: Option<String>,
    v: usize,
    m: usize,
    seed: Option<u64>,
    kipnis_shamir_attempts: Option<usize>,
    reconciliation_iterations: Option<usize>,
    basis: Vec<String>,
    canonical: Option<Vec<String>>,
}

impl RecoveryOutput {
    fn from_report(report: &RecoveryReport, canonical: bool) -> Self {
        Self {
            success: report.success,
            status: if report.success { "complete" } else { "incomplete" }.to_string(),
            reason: None,
            v: report.params.v,
            m: report.params.m,
            seed: Some(report.seed),
            kipnis_shamir_attempts: Some(report.kipnis_shamir_attempts),
            reconciliation_iterations: Some(report.reconciliation.iterations),
            basis: report.basis.iter().map(|b| encode_vector(b)).collect(),
            canonical: canonical
                .then(|| report.canonical.iter().map(|b| encode_vector(b)).collect()),
        }
    }

    fn from_failure(pk: &PublicKey, seed: u64, e: &RecoveryError) -> Self {
        let (kipnis_shamir_attempts, reconciliation_iterations) = match e {
            RecoveryError::NoSolutionFound {
                stage: Stage::KipnisShamir,
                attempts,
                ..
            } => (Some(*attempts), None),
            RecoveryError::NoSolutionFound {
                stage: Stage::Reconciliation,
                attempts,
                ..
            } => (None, Some(*attempts)),
            RecoveryError::NeedsRandomization { iteration, .. }
            | RecoveryError::NeedsMoreVectors { iteration, .. } => (None, Some(*iteration)),
            _ => (None, None),
        };
        Self {
            success: false,
            status: "failed".to_string(),
            reason: Some(e.to_string()),
            v: pk.params().v,
            m: pk.params().m,
            seed: Some(seed),
            kipnis_shamir_attempts,
            reconciliation_iterations,
            basis: e
                .partial_basis()
                .unwrap_or_default()
                .iter()
                .map(|b| encode_vector(b))
                .collect(),
            canonical: None,
        }
    }
}

#[derive(Serialize)]
struct VerifyOutput {
    valid: bool,
    failing_equation: Option<usize>,
}

fn format_output(output: &RecoveryOutput, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(output)?);
    }

    let mut text = String::new();
    text.push_str(&format!("Oil space recovery (v={}, m={})\n", output.v, output.m));
    if let Some(seed) = output.seed {
        text.push_str(&format!("  Seed: {}\n", seed));
    }
    if let Some(attempts) = output.kipnis_shamir_attempts {
        text.push_str(&format!("  Kipnis-Shamir attempts: {}\n", attempts));
    }
    if let Some(iterations) = output.reconciliation_iterations {
        text.push_str(&format!("  Reconciliation iterations: {}\n", iterations));
    }
    text.push_str(&format!("  Status: {}\n", output.status));
    if let Some(reason) = &output.reason {
        text.push_str(&format!("  Reason: {}\n", reason));
    }

    text.push_str(&format!("\nBasis ({} of {} vectors):\n", output.basis.len(), output.m));
    for (i, b) in output.basis.iter().enumerate() {
        text.push_str(&format!("  [{}] {}\n", i, b));
    }
    if let Some(canonical) = &output.canonical {
        text.push_str("\nCanonical form:\n");
        for (i, b) in canonical.iter().enumerate() {
            text.push_str(&format!("  [{}] {}\n", i, b));
        }
    }
    Ok(text)
}
