//! Motion Match command-line scorer.
//!
//! Loads a library export and a single-motion export, scores the motion
//! against every reference and reports the detection decision. Key commands
//! of a detected, mapped motion are written to stdout as JSON lines.
//!
//! ```text
//! motion-match <library.json> <candidate.json> [--config cfg.json]
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::env;
use std::fs;
use std::io;
use std::process::ExitCode;

use motion_match::actions::JsonLineDispatcher;
use motion_match::export::MotionExport;
use motion_match::{DetectionConfig, DetectionController, DetectionOutcome, MotionError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

struct Args {
    library: String,
    candidate: String,
    config: Option<String>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Option<Args> {
    let mut positional = Vec::new();
    let mut config = None;

    while let Some(arg) = args.next() {
        if arg == "--config" {
            config = Some(args.next()?);
        } else {
            positional.push(arg);
        }
    }

    if positional.len() != 2 {
        return None;
    }
    let candidate = positional.pop()?;
    let library = positional.pop()?;
    Some(Args {
        library,
        candidate,
        config,
    })
}

fn run(args: &Args) -> Result<bool, MotionError> {
    let config = match &args.config {
        Some(path) => serde_json::from_str::<DetectionConfig>(&fs::read_to_string(path)?)?,
        None => DetectionConfig::default(),
    };

    let mut controller = DetectionController::new(config, JsonLineDispatcher::new(io::stdout()));
    let count = controller.import_library(&fs::read_to_string(&args.library)?)?;
    tracing::info!(motions = count, path = %args.library, "Loaded library");

    let candidate = MotionExport::from_json(&fs::read_to_string(&args.candidate)?)?;

    let evaluation = controller.evaluate(&candidate.sequence);
    println!(
        "candidate: {} frames, {:.0} ms, max displacement {:.4}",
        evaluation.metrics.total_frames, evaluation.metrics.duration, evaluation.metrics.max_displacement
    );
    for entry in &evaluation.scores {
        println!(
            "  {:<20} score {:.3} (angle {:.3}, distance {:.3}, duration {:.3}) threshold {:.2}",
            entry.name,
            entry.result.score,
            entry.result.angle_score,
            entry.result.distance_score,
            entry.result.duration_score,
            entry.threshold,
        );
    }

    match controller.detect(candidate.sequence, 0) {
        DetectionOutcome::Detected(detection) => {
            println!("detected: {} ({:.3})", detection.name, detection.score);
            Ok(true)
        }
        DetectionOutcome::Rejected(reason) => {
            println!("no detection: {:?}", reason);
            Ok(false)
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let Some(args) = parse_args(env::args().skip(1)) else {
        eprintln!("Usage: motion-match <library.json> <candidate.json> [--config cfg.json]");
        return ExitCode::from(2);
    };

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::error!(error = %e, "motion-match failed");
            ExitCode::from(2)
        }
    }
}
