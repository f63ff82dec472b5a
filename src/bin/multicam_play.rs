use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use d435i_multicam_recorder::cli::PlaybackArgs;
use d435i_multicam_recorder::playback::{self, Acknowledge, LineAck, NoWait};
use d435i_multicam_recorder::sink::{FrameSink, PnmDumpSink, SummarySink};
use d435i_multicam_recorder::{init_tracing, DecodeError, Recording, RecordingFile};

fn main() -> ExitCode {
    let args = PlaybackArgs::parse();
    init_tracing();

    let Some(path) = args.path else {
        return ExitCode::SUCCESS;
    };

    let recording = match Recording::open(&path) {
        Ok(recording) => recording,
        Err(DecodeError::UnsupportedFormat { header }) => {
            let _ = playback::write_header_line(&mut io::stdout(), &header);
            eprintln!("{}: {}", path.display(), DecodeError::UnsupportedFormat { header });
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("{}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    };

    if let Some(file) = RecordingFile::parse(&path) {
        tracing::info!(
            session = %format!("{}_{}", file.prefix, file.timestamp),
            role = %file.role,
            device = file.device_index,
            "playing"
        );
    }

    let mut sinks: Vec<Box<dyn FrameSink>> = vec![Box::new(SummarySink::default())];
    if let Some(dir) = &args.dump_dir {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "frame".to_string());
        match PnmDumpSink::new(dir, stem) {
            Ok(sink) => sinks.push(Box::new(sink)),
            Err(e) => {
                eprintln!("{}: {e}", dir.display());
                return ExitCode::FAILURE;
            }
        }
    }

    let mut ack: Box<dyn Acknowledge> = if args.no_wait {
        Box::new(NoWait)
    } else {
        Box::new(LineAck::new(io::stdin().lock()))
    };

    let mut out = io::stdout().lock();
    match playback::play(recording, &mut sinks, ack.as_mut(), &mut out) {
        Ok(summary) => {
            let _ = out.flush();
            tracing::info!(
                frames = summary.frames,
                truncated_tail = summary.truncated_tail,
                "done"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {e}", path.display());
            ExitCode::FAILURE
        }
    }
}
