// THEORY:
// `visual_tester` is the command-line front end of the comparison engine. It
// exists to be dropped into a CI job:
//
//   visual_tester compare baseline.png candidate.png --max-changed-percent 0.5
//
// prints a summary (or JSON), writes the review artifacts, and exits non-zero
// when the change exceeds the gate. `batch` runs a whole manifest of pairs on
// the worker pool.
//
// Exit codes: 0 = within the gate, 1 = gate exceeded, 2 = the run failed.

mod manifest;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use manifest::Manifest;
use regress_vision::{BatchRunner, CompareConfig, ComparisonPipeline, ComparisonResult, Strategy};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const EXIT_GATE_EXCEEDED: u8 = 1;
const EXIT_FAILED: u8 = 2;

#[derive(Parser)]
#[command(name = "visual_tester")]
#[command(about = "Compare UI screenshots and report where they changed")]
#[command(version)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare a baseline screenshot against a candidate.
    Compare {
        baseline: String,
        candidate: String,

        /// Directory for the artifacts (default: `output` under the project root).
        #[arg(long)]
        out: Option<PathBuf>,

        /// absdiff or ssim.
        #[arg(long)]
        strategy: Option<Strategy>,

        /// Skip feature-based alignment and only resize the candidate.
        #[arg(long)]
        no_align: bool,

        /// Smallest region area, in square pixels, that gets a bounding box.
        #[arg(long)]
        min_area: Option<f64>,

        /// TOML file with comparison settings.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Extra directory to search for the screenshots. Repeatable.
        #[arg(long = "search-root")]
        search_roots: Vec<PathBuf>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,

        /// Exit with status 1 when more than this percentage changed.
        #[arg(long)]
        max_changed_percent: Option<f64>,
    },
    /// Run every `[[job]]` of a TOML manifest.
    Batch {
        manifest: PathBuf,

        #[arg(long)]
        workers: Option<usize>,

        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    ExitCode::from(exit_status(run(cli.command)))
}

fn exit_status(outcome: Result<u8>) -> u8 {
    match outcome {
        Ok(status) => status,
        Err(e) => {
            eprintln!("error: {e:#}");
            EXIT_FAILED
        }
    }
}

fn run(command: Commands) -> Result<u8> {
    match command {
        Commands::Compare {
            baseline,
            candidate,
            out,
            strategy,
            no_align,
            min_area,
            config,
            search_roots,
            json,
            max_changed_percent,
        } => {
            let mut config = load_config(config.as_deref())?;
            config.search_roots.extend(search_roots);
            if no_align {
                config.align = false;
            }
            if let Some(strategy) = strategy {
                config.strategy = strategy;
            }
            if let Some(min_area) = min_area {
                config.min_area = min_area;
            }
            if let Some(out) = out {
                config.output_dir = out;
            }

            let pipeline = ComparisonPipeline::new(config)?;
            let request = pipeline.request(baseline, candidate);
            let result = pipeline
                .compare(&request)
                .with_context(|| format!("comparing {} with {}", request.baseline, request.candidate))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_summary(&request.baseline, &request.candidate, &result);
            }
            Ok(gate(&result, max_changed_percent))
        }
        Commands::Batch {
            manifest,
            workers,
            config,
        } => {
            let pipeline = ComparisonPipeline::new(load_config(config.as_deref())?)?;
            let manifest = Manifest::from_file(&manifest)?;
            let requests = manifest.requests(&pipeline);

            let mut runner = BatchRunner::new(pipeline);
            if let Some(workers) = workers {
                runner = runner.with_workers(workers);
            }

            let runtime = tokio::runtime::Runtime::new().context("failed to start the async runtime")?;
            let results = runtime.block_on(runner.run(requests.clone()));

            let mut failed = false;
            for (request, result) in requests.iter().zip(&results) {
                match result {
                    Ok(r) => println!(
                        "ok    {} vs {}: {:.4}% changed, {} regions ({})",
                        request.baseline,
                        request.candidate,
                        r.changed_percent(),
                        r.regions_count(),
                        r.alignment()
                    ),
                    Err(e) => {
                        failed = true;
                        println!("error {} vs {}: {e}", request.baseline, request.candidate);
                    }
                }
            }
            Ok(if failed { EXIT_FAILED } else { 0 })
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<CompareConfig> {
    match path {
        Some(path) => Ok(CompareConfig::from_toml_file(path)?),
        None => Ok(CompareConfig::default()),
    }
}

fn print_summary(baseline: &str, candidate: &str, result: &ComparisonResult) {
    println!("{baseline} vs {candidate}");
    println!("  alignment: {}", result.alignment());
    println!("  method:    {}", result.strategy());
    println!(
        "  changed:   {} / {} pixels ({:.4}%)",
        result.changed_pixels(),
        result.total_pixels(),
        result.changed_percent()
    );
    println!("  regions:   {}", result.regions_count());
    if let Some(score) = result.similarity_score() {
        println!("  ssim:      {score:.4}");
    }
    for (name, path) in result.output_paths() {
        println!("  {name:?}: {}", path.display());
    }
}

fn gate(result: &ComparisonResult, max_changed_percent: Option<f64>) -> u8 {
    match max_changed_percent {
        Some(limit) if result.changed_percent() > limit => {
            tracing::warn!(
                changed_percent = result.changed_percent(),
                limit,
                "visual change exceeds the allowed percentage"
            );
            EXIT_GATE_EXCEEDED
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn screenshot(dir: &Path, name: &str, square: bool) -> String {
        let path = dir.join(name);
        let mut image = RgbImage::from_pixel(64, 64, Rgb([200, 200, 200]));
        if square {
            for y in 20..40 {
                for x in 20..40 {
                    image.put_pixel(x, y, Rgb([20, 20, 20]));
                }
            }
        }
        image.save(&path).expect("write fixture");
        path.display().to_string()
    }

    fn changed_result(dir: &Path) -> ComparisonResult {
        let baseline = screenshot(dir, "baseline.png", false);
        let candidate = screenshot(dir, "candidate.png", true);
        regress_vision::compare(
            &baseline,
            &candidate,
            Some(&dir.join("out")),
            Strategy::AbsDiff,
            false,
            10.0,
        )
        .expect("compare")
    }

    #[test]
    fn change_over_the_limit_fails_the_gate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = changed_result(dir.path());
        assert!(result.changed_percent() > 0.0);
        assert_eq!(gate(&result, Some(result.changed_percent() / 2.0)), EXIT_GATE_EXCEEDED);
        assert_eq!(gate(&result, Some(0.0)), EXIT_GATE_EXCEEDED);
    }

    #[test]
    fn change_at_or_under_the_limit_passes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = changed_result(dir.path());
        assert_eq!(gate(&result, Some(result.changed_percent())), 0);
        assert_eq!(gate(&result, Some(100.0)), 0);
    }

    #[test]
    fn no_limit_never_fails_the_gate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = changed_result(dir.path());
        assert_eq!(gate(&result, None), 0);
    }

    #[test]
    fn failed_run_exits_with_two() {
        let dir = tempfile::tempdir().expect("tempdir");
        let outcome = run(Commands::Compare {
            baseline: dir.path().join("absent_baseline.png").display().to_string(),
            candidate: dir.path().join("absent_candidate.png").display().to_string(),
            out: Some(dir.path().join("out")),
            strategy: Some(Strategy::AbsDiff),
            no_align: true,
            min_area: None,
            config: None,
            search_roots: Vec::new(),
            json: false,
            max_changed_percent: None,
        });
        assert!(outcome.is_err());
        assert_eq!(exit_status(outcome), EXIT_FAILED);
        assert_eq!(exit_status(Ok(EXIT_GATE_EXCEEDED)), EXIT_GATE_EXCEEDED);
        assert_eq!(exit_status(Ok(0)), 0);
    }

    #[test]
    fn compare_command_applies_the_gate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let baseline = screenshot(dir.path(), "baseline.png", false);
        let candidate = screenshot(dir.path(), "candidate.png", true);
        let command = |limit| Commands::Compare {
            baseline: baseline.clone(),
            candidate: candidate.clone(),
            out: Some(dir.path().join("out")),
            strategy: Some(Strategy::AbsDiff),
            no_align: true,
            min_area: None,
            config: None,
            search_roots: Vec::new(),
            json: true,
            max_changed_percent: limit,
        };
        assert_eq!(run(command(Some(0.0))).expect("run"), EXIT_GATE_EXCEEDED);
        assert_eq!(run(command(None)).expect("run"), 0);
    }
}
