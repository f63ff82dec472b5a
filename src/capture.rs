//! Multi-device capture loop.
//!
//! One tick visits every bound device in enumeration order, fetches one
//! depth and one color frame, and appends both under the same timestamp.
//! Devices are sampled one after another, each with its own clock reading.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{CaptureConfig, FetchMode};
use crate::device::{CameraContext, CameraDevice};
use crate::error::{CaptureError, CaptureResult};
use crate::logio::RecordingWriter;
use crate::metadata::write_device_metadata;
use crate::session::{RecordingSession, StreamRole};
use crate::types::{Stream, StreamHeader};

const PROGRESS_INTERVAL: u64 = 30;

/// Second-resolution timestamps for frame records.
pub trait Clock {
    fn now_secs(&mut self) -> u32;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&mut self) -> u32 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as u32
    }
}

/// A device and the two writers it feeds, fixed for the whole session.
pub struct DeviceBinding<D, W: Write = BufWriter<File>> {
    index: usize,
    device: D,
    depth_stream: Stream,
    color_stream: Stream,
    depth: RecordingWriter<W>,
    color: RecordingWriter<W>,
    has_frames: bool,
}

impl<D: CameraDevice, W: Write> DeviceBinding<D, W> {
    pub fn new(
        index: usize,
        device: D,
        (depth_stream, color_stream): (Stream, Stream),
        depth: RecordingWriter<W>,
        color: RecordingWriter<W>,
    ) -> Self {
        Self {
            index,
            device,
            depth_stream,
            color_stream,
            depth,
            color,
            has_frames: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// In `Latest` mode a poll without news re-records the previous set,
    /// except before the first set has arrived, where it blocks instead.
    fn fetch(&mut self, mode: FetchMode) -> CaptureResult<()> {
        let fetched = match mode {
            FetchMode::Blocking => self.device.wait_for_frames(),
            FetchMode::Latest => match self.device.poll_for_frames() {
                Ok(false) if !self.has_frames => {
                    tracing::debug!(device = self.index, "no frame set yet, waiting");
                    self.device.wait_for_frames()
                }
                polled => polled.map(|_| ()),
            },
        };
        fetched.map_err(|source| CaptureError::Fetch {
            device: self.index,
            source,
        })?;
        self.has_frames = true;
        Ok(())
    }

    fn record(&mut self, timestamp: u32) -> CaptureResult<()> {
        let fetch_err = |source| CaptureError::Fetch {
            device: self.index,
            source,
        };
        let depth = self.device.frame_data(self.depth_stream).map_err(fetch_err)?;
        let color = self.device.frame_data(self.color_stream).map_err(fetch_err)?;
        // both or neither, so the two files stay record-for-record paired
        self.depth.check_payload(depth)?;
        self.color.check_payload(color)?;
        self.depth.append(timestamp, depth)?;
        self.color.append(timestamp, color)
    }

    /// Flush both writers and stop the device. The first failure is returned.
    pub fn close(self) -> CaptureResult<(RecordingWriter<W>, RecordingWriter<W>)> {
        let Self {
            index,
            mut device,
            mut depth,
            mut color,
            ..
        } = self;
        let flushed = depth.flush().and(color.flush());
        let stopped = device.stop().map_err(|source| CaptureError::Fetch {
            device: index,
            source,
        });
        tracing::info!(
            device = index,
            frames = depth.frames_written(),
            "closed recordings"
        );
        flushed.and(stopped)?;
        Ok((depth, color))
    }
}

/// Per-session capture driver.
pub struct CaptureLoop<D, W: Write = BufWriter<File>, C = SystemClock> {
    bindings: Vec<DeviceBinding<D, W>>,
    mode: FetchMode,
    clock: C,
    ticks: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSummary {
    pub devices: usize,
    pub ticks: u64,
    pub recordings: Vec<PathBuf>,
}

impl<D: CameraDevice, W: Write, C: Clock> CaptureLoop<D, W, C> {
    pub fn new(bindings: Vec<DeviceBinding<D, W>>, mode: FetchMode, clock: C) -> Self {
        Self {
            bindings,
            mode,
            clock,
            ticks: 0,
        }
    }

    pub fn device_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// One frame per stream per device. Any failure aborts the tick.
    pub fn tick(&mut self) -> CaptureResult<()> {
        for binding in &mut self.bindings {
            binding.fetch(self.mode)?;
            let timestamp = self.clock.now_secs();
            binding.record(timestamp)?;
        }
        self.ticks += 1;
        tracing::debug!(tick = self.ticks, "tick complete");
        Ok(())
    }

    /// Tick until `stop` is set or `max_frames` ticks were recorded.
    pub fn run(&mut self, stop: &AtomicBool, max_frames: Option<u64>) -> CaptureResult<u64> {
        while !stop.load(Ordering::Relaxed) && max_frames.map_or(true, |max| self.ticks < max) {
            self.tick()?;
            if self.ticks % PROGRESS_INTERVAL == 0 {
                tracing::info!(ticks = self.ticks, devices = self.bindings.len(), "recording");
            }
        }
        Ok(self.ticks)
    }

    /// Close every binding, even after an earlier one failed.
    pub fn finish(self) -> CaptureResult<Vec<(RecordingWriter<W>, RecordingWriter<W>)>> {
        close_all(self.bindings)
    }
}

fn close_all<D: CameraDevice, W: Write>(
    bindings: Vec<DeviceBinding<D, W>>,
) -> CaptureResult<Vec<(RecordingWriter<W>, RecordingWriter<W>)>> {
    let mut first_err = None;
    let mut writers = Vec::with_capacity(bindings.len());
    for binding in bindings {
        match binding.close() {
            Ok(pair) => writers.push(pair),
            Err(e) => {
                tracing::error!("teardown failed: {e}");
                first_err.get_or_insert(e);
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(writers),
    }
}

/// Enable, start and bind the first `count` devices of `ctx`.
///
/// Writes the metadata files and `.rec` headers of every device. On failure
/// the devices configured so far are closed again.
pub fn configure_devices<Ctx: CameraContext>(
    ctx: &mut Ctx,
    config: &CaptureConfig,
    session: &RecordingSession,
    count: usize,
) -> CaptureResult<Vec<DeviceBinding<Ctx::Device>>> {
    let mut bindings = Vec::with_capacity(count);
    for index in 0..count {
        match configure_device(ctx, config, session, index) {
            Ok(binding) => bindings.push(binding),
            Err(e) => {
                let _ = close_all(bindings);
                return Err(e);
            }
        }
    }
    Ok(bindings)
}

fn configure_device<Ctx: CameraContext>(
    ctx: &mut Ctx,
    config: &CaptureConfig,
    session: &RecordingSession,
    index: usize,
) -> CaptureResult<DeviceBinding<Ctx::Device>> {
    let config_err = |source| CaptureError::Configuration {
        device: index,
        source,
    };

    let mut device = ctx.open_device(index).map_err(config_err)?;
    tracing::info!(device = index, name = device.name(), serial = device.serial(), "starting");
    device
        .enable_stream(Stream::Depth, config.depth_stream_config())
        .map_err(config_err)?;
    device
        .enable_stream(Stream::Color, config.color_stream_config())
        .map_err(config_err)?;
    device.start().map_err(config_err)?;

    match open_recordings(&device, config, session, index) {
        Ok((depth, color)) => Ok(DeviceBinding::new(
            index,
            device,
            Stream::recorded_pair(config.rectified),
            depth,
            color,
        )),
        Err(e) => {
            let _ = device.stop();
            Err(e)
        }
    }
}

fn open_recordings<D: CameraDevice>(
    device: &D,
    config: &CaptureConfig,
    session: &RecordingSession,
    index: usize,
) -> CaptureResult<(RecordingWriter, RecordingWriter)> {
    let (depth_stream, color_stream) = Stream::recorded_pair(config.rectified);
    write_device_metadata(session, index, device, depth_stream, color_stream)?;

    let header = |stream: Stream| -> CaptureResult<StreamHeader> {
        let resolution = device
            .stream_resolution(stream)
            .map_err(|source| CaptureError::Configuration {
                device: index,
                source,
            })?;
        Ok(StreamHeader::new(resolution, stream.format()))
    };
    let depth_header = header(depth_stream)?;
    let color_header = header(color_stream)?;

    let depth = RecordingWriter::open(&session.path(StreamRole::Depth, index), depth_header)?;
    let color = RecordingWriter::open(&session.path(StreamRole::Color, index), color_header)?;
    tracing::info!(
        device = index,
        depth = ?depth_header,
        color = ?color_header,
        "recording to {}",
        session.path(StreamRole::Depth, index).display()
    );
    Ok((depth, color))
}

/// Run a whole session against `ctx`: configure, tick until stopped, tear down.
///
/// Uses the first `min(available, max_cameras)` devices for both the header
/// and the frame phase.
pub fn record<Ctx: CameraContext>(
    ctx: &mut Ctx,
    config: &CaptureConfig,
    session: &RecordingSession,
    stop: &AtomicBool,
) -> CaptureResult<CaptureSummary> {
    record_with_clock(ctx, config, session, stop, SystemClock)
}

pub fn record_with_clock<Ctx: CameraContext, C: Clock>(
    ctx: &mut Ctx,
    config: &CaptureConfig,
    session: &RecordingSession,
    stop: &AtomicBool,
    clock: C,
) -> CaptureResult<CaptureSummary> {
    config.validate()?;
    let available = ctx.device_count();
    if available == 0 {
        return Err(CaptureError::DeviceUnavailable);
    }
    let count = available.min(config.max_cameras);
    tracing::info!("{available} device(s) detected, recording from {count}");

    let bindings = configure_devices(ctx, config, session, count)?;
    let mut capture = CaptureLoop::new(bindings, config.fetch_mode, clock);
    let ran = capture.run(stop, config.max_frames);
    let devices = capture.device_count();
    let closed = capture.finish();

    let ticks = ran?;
    closed?;
    let recordings = (0..devices)
        .flat_map(|i| {
            [
                session.path(StreamRole::Depth, i),
                session.path(StreamRole::Color, i),
            ]
        })
        .collect();
    Ok(CaptureSummary {
        devices,
        ticks,
        recordings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logio::{FrameImage, Recording};
    use crate::synthetic::{SyntheticContext, SyntheticDevice};
    use crate::types::{PixelFormat, Resolution, StreamConfig};

    /// Clock that advances one second per reading.
    struct StepClock(u32);

    impl Clock for StepClock {
        fn now_secs(&mut self) -> u32 {
            self.0 += 1;
            self.0
        }
    }

    fn small_config(dir: &std::path::Path) -> CaptureConfig {
        CaptureConfig {
            color: Resolution::new(6, 4),
            depth: Resolution::new(4, 2),
            max_frames: Some(3),
            output_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    fn started(index: usize) -> SyntheticDevice {
        let mut dev = SyntheticDevice::new(index);
        dev.enable_stream(
            Stream::Depth,
            StreamConfig {
                resolution: Resolution::new(4, 2),
                format: PixelFormat::Z16,
                fps: 30,
            },
        )
        .unwrap();
        dev.enable_stream(
            Stream::Color,
            StreamConfig {
                resolution: Resolution::new(6, 4),
                format: PixelFormat::Rgb8,
                fps: 30,
            },
        )
        .unwrap();
        dev.start().unwrap();
        dev
    }

    fn memory_binding(
        index: usize,
        device: SyntheticDevice,
    ) -> DeviceBinding<SyntheticDevice, Vec<u8>> {
        let pair = (Stream::Depth, Stream::Color);
        let depth = RecordingWriter::new(
            Vec::new(),
            StreamHeader::new(Resolution::new(4, 2), PixelFormat::Z16),
        )
        .unwrap();
        let color = RecordingWriter::new(
            Vec::new(),
            StreamHeader::new(Resolution::new(6, 4), PixelFormat::Rgb8),
        )
        .unwrap();
        DeviceBinding::new(index, device, pair, depth, color)
    }

    #[test]
    fn depth_and_color_share_a_timestamp_per_device() {
        let bindings = vec![memory_binding(0, started(0)), memory_binding(1, started(1))];
        let mut capture = CaptureLoop::new(bindings, FetchMode::Blocking, StepClock(100));
        capture.tick().unwrap();
        capture.tick().unwrap();

        let writers = capture.finish().unwrap();
        // device 0 then device 1, one clock reading each per tick
        let expected = [[101, 103], [102, 104]];
        for ((depth, color), stamps) in writers.into_iter().zip(expected) {
            let (depth, color) = (depth.close().unwrap(), color.close().unwrap());
            let depth: Vec<u32> = Recording::from_reader(&depth[..])
                .unwrap()
                .map(|f| f.unwrap().timestamp)
                .collect();
            let color: Vec<u32> = Recording::from_reader(&color[..])
                .unwrap()
                .map(|f| f.unwrap().timestamp)
                .collect();
            assert_eq!(depth, stamps);
            assert_eq!(color, stamps);
        }
    }

    #[test]
    fn payloads_are_device_buffers() {
        let mut capture =
            CaptureLoop::new(vec![memory_binding(0, started(2))], FetchMode::Blocking, StepClock(0));
        capture.tick().unwrap();
        let (depth, _) = capture.finish().unwrap().pop().unwrap();
        let bytes = depth.close().unwrap();
        let frame = Recording::from_reader(&bytes[..]).unwrap().next().unwrap().unwrap();

        let expected = SyntheticDevice::depth_pattern(
            SyntheticDevice::new(2).seed(),
            1,
            Resolution::new(4, 2),
        );
        let FrameImage::Depth(img) = frame.image else {
            panic!("expected depth");
        };
        assert_eq!(bytemuck::cast_slice::<u16, u8>(img.as_slice().unwrap()), &expected[..]);
    }

    #[test]
    fn latest_mode_may_repeat_frames() {
        let device = started(0).with_poll_stride(2);
        let mut capture =
            CaptureLoop::new(vec![memory_binding(0, device)], FetchMode::Latest, StepClock(0));
        let stop = AtomicBool::new(false);
        assert_eq!(capture.run(&stop, Some(4)).unwrap(), 4);
        assert_eq!(capture.bindings[0].device().frame_number(), 2);

        let (_, color) = capture.finish().unwrap().pop().unwrap();
        let frames: Vec<_> = Recording::from_reader(&color.close().unwrap()[..])
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0].image, frames[1].image);
        assert_ne!(frames[1].image, frames[2].image);
    }

    #[test]
    fn latest_mode_waits_for_the_first_frame_set() {
        let device = started(0).with_empty_first_polls(1);
        let mut capture =
            CaptureLoop::new(vec![memory_binding(0, device)], FetchMode::Latest, StepClock(0));
        capture.tick().unwrap();
        assert_eq!(capture.bindings[0].device().frame_number(), 1);
        capture.tick().unwrap();
        assert_eq!(capture.bindings[0].device().frame_number(), 2);

        let (depth, color) = capture.finish().unwrap().pop().unwrap();
        assert_eq!(depth.frames_written(), 2);
        assert_eq!(color.frames_written(), 2);
    }

    #[test]
    fn color_size_mismatch_records_neither_stream() {
        let depth = RecordingWriter::new(
            Vec::new(),
            StreamHeader::new(Resolution::new(4, 2), PixelFormat::Z16),
        )
        .unwrap();
        // the device delivers 6x4 color
        let color = RecordingWriter::new(
            Vec::new(),
            StreamHeader::new(Resolution::new(5, 4), PixelFormat::Rgb8),
        )
        .unwrap();
        let binding = DeviceBinding::new(0, started(0), (Stream::Depth, Stream::Color), depth, color);
        let mut capture = CaptureLoop::new(vec![binding], FetchMode::Blocking, StepClock(0));

        let err = capture.tick().unwrap_err();
        assert!(matches!(
            err,
            CaptureError::SizeMismatch {
                expected: 60,
                actual: 72
            }
        ));
        let (depth, color) = capture.finish().unwrap().pop().unwrap();
        assert_eq!(depth.frames_written(), 0);
        assert_eq!(color.frames_written(), 0);
        assert_eq!(depth.close().unwrap().len(), StreamHeader::SIZE);
    }

    #[test]
    fn stop_flag_is_checked_before_each_tick() {
        let mut capture =
            CaptureLoop::new(vec![memory_binding(0, started(0))], FetchMode::Blocking, StepClock(0));
        let stop = AtomicBool::new(true);
        assert_eq!(capture.run(&stop, None).unwrap(), 0);
    }

    #[test]
    fn fetch_failure_aborts_and_still_closes() {
        let dir = tempfile::tempdir().unwrap();
        let config = CaptureConfig {
            max_frames: Some(10),
            ..small_config(dir.path())
        };
        let session = RecordingSession::new("fail", 7, dir.path());
        let mut ctx = SyntheticContext::from_devices(vec![
            SyntheticDevice::new(0),
            SyntheticDevice::new(1).with_fetch_failure_after(2),
        ]);
        let stop = AtomicBool::new(false);

        let err = record_with_clock(&mut ctx, &config, &session, &stop, StepClock(0)).unwrap_err();
        assert!(matches!(err, CaptureError::Fetch { device: 1, .. }));

        // device 0 got three ticks in before device 1 failed on the third
        let count = |role, i| {
            Recording::open(&session.path(role, i))
                .unwrap()
                .map(Result::unwrap)
                .count()
        };
        assert_eq!(count(StreamRole::Depth, 0), 3);
        assert_eq!(count(StreamRole::Color, 0), 3);
        assert_eq!(count(StreamRole::Depth, 1), 2);
        assert_eq!(count(StreamRole::Color, 1), 2);
    }

    #[test]
    fn configuration_failure_creates_no_recordings_for_that_device() {
        let dir = tempfile::tempdir().unwrap();
        let config = CaptureConfig {
            color: Resolution::new(10_000, 4),
            ..small_config(dir.path())
        };
        let session = RecordingSession::new("cfg", 1, dir.path());
        let mut ctx = SyntheticContext::new(1);
        let stop = AtomicBool::new(false);

        let err = record(&mut ctx, &config, &session, &stop).unwrap_err();
        assert!(matches!(err, CaptureError::Configuration { device: 0, .. }));
        assert!(!session.path(StreamRole::Color, 0).exists());
    }

    #[test]
    fn no_device_is_device_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let session = RecordingSession::new("none", 1, dir.path());
        let mut ctx = SyntheticContext::new(0);
        let stop = AtomicBool::new(false);

        let err = record(&mut ctx, &small_config(dir.path()), &session, &stop).unwrap_err();
        assert!(matches!(err, CaptureError::DeviceUnavailable));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn max_cameras_above_available_uses_what_exists() {
        let dir = tempfile::tempdir().unwrap();
        let config = CaptureConfig {
            max_cameras: 2,
            ..small_config(dir.path())
        };
        let session = RecordingSession::new("one", 5, dir.path());
        let mut ctx = SyntheticContext::new(1);
        let stop = AtomicBool::new(false);

        let summary = record_with_clock(&mut ctx, &config, &session, &stop, StepClock(0)).unwrap();
        assert_eq!(summary.devices, 1);
        assert_eq!(summary.ticks, 3);
        assert_eq!(summary.recordings.len(), 2);
        // 3 metadata + 2 raw files, none for a second device
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 5);
        assert!(!session.path(StreamRole::Depth, 1).exists());
    }

    #[test]
    fn max_cameras_below_available_clips() {
        let dir = tempfile::tempdir().unwrap();
        let config = CaptureConfig {
            max_cameras: 2,
            ..small_config(dir.path())
        };
        let session = RecordingSession::new("clip", 5, dir.path());
        let mut ctx = SyntheticContext::new(3);
        let stop = AtomicBool::new(false);

        let summary = record_with_clock(&mut ctx, &config, &session, &stop, StepClock(0)).unwrap();
        assert_eq!(summary.devices, 2);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 10);
        assert!(!session.path(StreamRole::Extrin, 2).exists());
    }

    #[test]
    fn rectified_depth_is_color_sized() {
        let dir = tempfile::tempdir().unwrap();
        let session = RecordingSession::new("rect", 9, dir.path());
        let mut ctx = SyntheticContext::new(1);
        let stop = AtomicBool::new(false);
        record(&mut ctx, &small_config(dir.path()), &session, &stop).unwrap();

        let depth = Recording::open(&session.path(StreamRole::Depth, 0)).unwrap();
        assert_eq!((depth.header().width, depth.header().height), (6, 4));
        assert_eq!(depth.header().bytes_per_channel, 2);

        let dir = tempfile::tempdir().unwrap();
        let session = RecordingSession::new("raw", 9, dir.path());
        let config = CaptureConfig {
            rectified: false,
            ..small_config(dir.path())
        };
        let mut ctx = SyntheticContext::new(1);
        record(&mut ctx, &config, &session, &stop).unwrap();
        let depth = Recording::open(&session.path(StreamRole::Depth, 0)).unwrap();
        assert_eq!((depth.header().width, depth.header().height), (4, 2));
    }
}
