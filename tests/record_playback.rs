use std::io;
use std::sync::atomic::AtomicBool;

use d435i_multicam_recorder::playback::{play, NoWait};
use d435i_multicam_recorder::sink::SummarySink;
use d435i_multicam_recorder::synthetic::{SyntheticContext, SyntheticDevice};
use d435i_multicam_recorder::{
    record, CaptureConfig, Frame, FrameImage, PixelLayout, Recording, RecordingFile, RecordingSession,
    Resolution, StreamRole,
};

fn config(dir: &std::path::Path) -> CaptureConfig {
    CaptureConfig {
        recording_name: "bench_run".into(),
        max_cameras: 3,
        color: Resolution::new(8, 6),
        depth: Resolution::new(4, 4),
        max_frames: Some(5),
        output_dir: dir.to_path_buf(),
        ..Default::default()
    }
}

#[test]
fn two_cameras_record_and_play_back() {
    let dir = tempfile::tempdir().unwrap();
    let config = CaptureConfig {
        rectified: false,
        ..config(dir.path())
    };
    let session = RecordingSession::new(&config.recording_name, 1_700_000_000, dir.path());
    let mut ctx = SyntheticContext::new(2);
    let stop = AtomicBool::new(false);

    let summary = record(&mut ctx, &config, &session, &stop).unwrap();
    assert_eq!(summary.devices, 2);
    assert_eq!(summary.ticks, 5);

    for device in 0..2 {
        let seed = SyntheticDevice::new(device).seed();

        let depth = Recording::open(&session.path(StreamRole::Depth, device)).unwrap();
        assert_eq!(depth.layout(), PixelLayout::Wide);
        assert_eq!(depth.header().payload_size(), 4 * 4 * 2);
        let frames: Vec<_> = depth.map(Result::unwrap).collect();
        assert_eq!(frames.len(), 5);
        for (n, frame) in frames.iter().enumerate() {
            let expected =
                SyntheticDevice::depth_pattern(seed, n as u64 + 1, Resolution::new(4, 4));
            let FrameImage::Depth(img) = &frame.image else {
                panic!("expected depth");
            };
            assert_eq!(bytemuck::cast_slice::<u16, u8>(img.as_slice().unwrap()), &expected[..]);
        }

        let color = Recording::open(&session.path(StreamRole::Color, device)).unwrap();
        assert_eq!(color.layout(), PixelLayout::ByteTriple);
        let color_frames: Vec<_> = color.map(Result::unwrap).collect();
        let stamps = |f: &[Frame]| f.iter().map(|f| f.timestamp).collect::<Vec<_>>();
        assert_eq!(stamps(&frames[..]), stamps(&color_frames[..]));
    }
}

#[test]
fn session_files_are_discoverable_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let session = RecordingSession::new("bench_run", 42, dir.path());
    let mut ctx = SyntheticContext::new(1);
    record(&mut ctx, &config(dir.path()), &session, &AtomicBool::new(false)).unwrap();

    let mut roles: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| RecordingFile::parse(entry.unwrap().path()).unwrap())
        .inspect(|file| {
            assert_eq!(file.prefix, "bench_run");
            assert_eq!(file.timestamp, 42);
            assert_eq!(file.device_index, 0);
        })
        .map(|file| file.role.as_str())
        .collect();
    roles.sort_unstable();
    assert_eq!(
        roles,
        ["color", "depth", "extrin", "intrin_color", "intrin_depth"]
    );
}

#[test]
fn crash_mid_frame_still_decodes() {
    let dir = tempfile::tempdir().unwrap();
    let session = RecordingSession::new("crash", 1, dir.path());
    let mut ctx = SyntheticContext::new(1);
    record(&mut ctx, &config(dir.path()), &session, &AtomicBool::new(false)).unwrap();

    let path = session.path(StreamRole::Color, 0);
    let len = std::fs::metadata(&path).unwrap().len();
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len - 10).unwrap();
    drop(file);

    let recording = Recording::open(&path).unwrap();
    let mut sink = SummarySink::default();
    let summary = play(recording, &mut sink, &mut NoWait, &mut io::sink()).unwrap();
    assert_eq!(summary.frames, 4);
    assert!(summary.truncated_tail);
    assert!(sink.last().is_some());
}
