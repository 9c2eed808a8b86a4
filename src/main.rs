use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use threatfhe::config::{
    resolve_api, resolve_synthetic, ApiArgs, FileConfig, Prompter, SyntheticArgs,
};
use threatfhe::{dataset, pipeline, Report};

#[derive(Parser, Debug)]
#[command(version, about = "Encrypted threat score statistics")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch threat scores over HTTP and compute their encrypted mean
    Api(ApiArgs),
    /// Generate random threat scores and compute their encrypted mean and deviation
    Synthetic(SyntheticArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG selects verbosity, e.g. `RUST_LOG=threatfhe=debug`
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .compact()
        .with_file(false)
        .with_line_number(false)
        .without_time()
        .with_writer(io::stderr)
        .init();

    let outcome = match cli.command {
        Command::Api(args) => {
            let stdin = io::stdin();
            let mut prompter = Prompter::new(stdin.lock(), io::stdout(), !args.no_prompt);
            run_api(&args, &mut prompter)
        }
        Command::Synthetic(args) => run_synthetic(&args),
    };

    ExitCode::from(report_outcome(outcome, &mut io::stderr()))
}

/// Writes the error chain, `context: cause`, and returns the exit status.
fn report_outcome(outcome: anyhow::Result<()>, stderr: &mut impl Write) -> u8 {
    match outcome {
        Ok(()) => 0,
        Err(err) => {
            // nothing left to report to if stderr itself fails
            let _ = writeln!(stderr, "{err:#}");
            1
        }
    }
}

fn run_api<R: BufRead, W: Write>(args: &ApiArgs, prompter: &mut Prompter<R, W>) -> anyhow::Result<()> {
    let file = FileConfig::load_optional(args.common.config.as_deref())?;
    let config = resolve_api(args, file, prompter)?;

    println!("Fetching data from API...");
    let mut values = dataset::fetch(&config.api_url).context("Error fetching data from API")?;
    dataset::truncate_to(&mut values, config.dataset_size);

    let report = pipeline::run(&config.pipeline, &values)?;
    log_reference_error(&report, &values);
    print_report(&report);
    Ok(())
}

fn run_synthetic(args: &SyntheticArgs) -> anyhow::Result<()> {
    let file = FileConfig::load_optional(args.common.config.as_deref())?;
    let config = resolve_synthetic(args, file)?;

    println!("Generating Large Threat Dataset: {} records...", config.dataset_size);
    let mut rng = match config.seed {
        Some(seed) => ChaCha20Rng::seed_from_u64(seed),
        None => ChaCha20Rng::from_entropy(),
    };
    let values = dataset::generate_synthetic(config.dataset_size, &mut rng);

    let report = pipeline::run(&config.pipeline, &values)?;
    log_reference_error(&report, &values);
    print_report(&report);
    Ok(())
}

fn log_reference_error(report: &Report, values: &[f64]) {
    let (mean, variance) = pipeline::reference_stats(values);
    info!(
        scheme = %report.scheme,
        ciphertexts = report.ciphertexts,
        rotations = report.rotations,
        mean_error = (report.mean - mean).abs(),
        variance_error = report.variance.map(|v| (v - variance).abs()),
        setup = ?report.timings.setup,
        "run complete"
    );
}

fn print_report(report: &Report) {
    println!("Encryption Execution Time: {} ms", report.timings.encryption.as_millis());
    println!(
        "Homomorphic Computation Execution Time: {} ms",
        report.timings.computation.as_millis()
    );
    println!("Decryption Execution Time: {} ms", report.timings.decryption.as_millis());
    println!("Decrypted Mean Threat Score: {}", report.mean);
    if let Some(stddev) = report.stddev {
        println!("Decrypted Standard Deviation: {stddev}");
    }
}
