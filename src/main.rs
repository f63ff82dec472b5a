use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use d435i_multicam_recorder::cli::{self, CaptureArgs};
use d435i_multicam_recorder::synthetic::SyntheticContext;
use d435i_multicam_recorder::{capture, init_tracing, RecordingSession};

fn main() -> ExitCode {
    let argv: Vec<String> = std::env::args().collect();
    if cli::is_help_request(&argv) {
        let program = argv.first().map(String::as_str).unwrap_or("multicam-capture");
        print!("{}", cli::usage(program));
        return ExitCode::SUCCESS;
    }

    let args = CaptureArgs::parse_from(&argv);
    init_tracing();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &CaptureArgs) -> anyhow::Result<()> {
    let config = args.config();
    config.validate()?;
    tracing::info!(?config, "capture configuration");

    let stop = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler({
        let stop = stop.clone();
        move || {
            tracing::info!("Received Ctrl+C, finishing the current cycle...");
            stop.store(true, Ordering::Relaxed);
        }
    })
    .context("installing Ctrl+C handler")?;

    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("creating {}", config.output_dir.display()))?;
    let session = RecordingSession::starting_now(&config.recording_name, &config.output_dir);

    let mut ctx = SyntheticContext::new(args.synthetic_devices);
    let summary = capture::record(&mut ctx, &config, &session, &stop)?;

    tracing::info!(
        devices = summary.devices,
        ticks = summary.ticks,
        "recorded session {}_{}",
        session.prefix,
        session.timestamp
    );
    for path in &summary.recordings {
        println!("{}", path.display());
    }
    Ok(())
}
