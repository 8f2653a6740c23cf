//! Frame and metadata sources.
//!
//! A live camera implements both [`CaptureSource`] and [`MetadataSource`].
//! The shipped sources are file-backed or synthetic; both signal
//! [`FlycamError::EndOfStream`] at the end of their loop so the capture
//! thread can restart them.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::FlycamError;
use crate::types::Frame;
use crate::wire::MetadataField;

/// Metadata field names used when none are configured.
pub const DEFAULT_METADATA_FIELDS: [&str; 5] = ["exposure", "gain", "iso", "wbalance", "focus"];

// ── Traits ───────────────────────────────────────────────────────

/// Produces frames of a fixed shape.
pub trait CaptureSource: Send {
    /// Block until the next frame is available.
    ///
    /// `EndOfStream` asks the caller to [`restart`](Self::restart); any
    /// other error skips this frame.
    fn read_frame(&mut self) -> Result<Frame, FlycamError>;

    /// Rewind a finite source. Live sources have nothing to do.
    fn restart(&mut self) -> Result<(), FlycamError> {
        Ok(())
    }

    /// Frame interval the source expects to be read at, if it does not
    /// pace itself.
    fn frame_interval(&self) -> Option<Duration> {
        None
    }

    /// Short label for logs.
    fn describe(&self) -> String;
}

/// Answers point-in-time readings for a set of named fields.
pub trait MetadataSource: Send {
    /// Fill `values[i]` with the current reading of `fields[i]`.
    ///
    /// Unknown fields read as `0.0`. On error `values` is left untouched.
    fn read_metadata(&mut self, fields: &[MetadataField], values: &mut [f32])
    -> Result<(), FlycamError>;
}

impl<T: CaptureSource + ?Sized> CaptureSource for Box<T> {
    fn read_frame(&mut self) -> Result<Frame, FlycamError> {
        (**self).read_frame()
    }

    fn restart(&mut self) -> Result<(), FlycamError> {
        (**self).restart()
    }

    fn frame_interval(&self) -> Option<Duration> {
        (**self).frame_interval()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<T: MetadataSource + ?Sized> MetadataSource for Box<T> {
    fn read_metadata(
        &mut self,
        fields: &[MetadataField],
        values: &mut [f32],
    ) -> Result<(), FlycamError> {
        (**self).read_metadata(fields, values)
    }
}

/// Metadata source that reports nothing; every field reads `0.0`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMetadata;

impl MetadataSource for NoMetadata {
    fn read_metadata(
        &mut self,
        _fields: &[MetadataField],
        values: &mut [f32],
    ) -> Result<(), FlycamError> {
        values.fill(0.0);
        Ok(())
    }
}

// ── SyntheticSource ──────────────────────────────────────────────

/// Moving diagonal gradient with per-channel offsets.
///
/// Plays `loop_len` frames and then reports end of stream, like a short
/// test clip.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    channels: u8,
    loop_len: u64,
    position: u64,
    frame_interval: Option<Duration>,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, channels: u8) -> Result<Self, FlycamError> {
        if width == 0 || height == 0 || channels == 0 {
            return Err(FlycamError::InvalidConfig(format!(
                "synthetic source needs a non-empty shape, got {width}x{height}x{channels}"
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            loop_len: 256,
            position: 0,
            frame_interval: None,
        })
    }

    /// Frames per loop before `EndOfStream`.
    pub fn with_loop_len(mut self, frames: u64) -> Self {
        self.loop_len = frames.max(1);
        self
    }

    /// Report a frame interval matching `fps`.
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.frame_interval = (fps > 0).then(|| Duration::from_secs_f64(1.0 / fps as f64));
        self
    }

    /// Index of the next frame within the loop.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn render(&self, t: u64) -> Vec<u8> {
        let (w, h, c) = (self.width as usize, self.height as usize, self.channels as usize);
        let shift = (t % 256) as usize;
        let span = w.saturating_sub(1).max(1);
        let mut data = Vec::with_capacity(w * h * c);
        for y in 0..h {
            for x in 0..w {
                let base = x * 255 / span + y + shift;
                for ch in 0..c {
                    data.push((base + ch * 85) as u8);
                }
            }
        }
        data
    }
}

impl CaptureSource for SyntheticSource {
    fn read_frame(&mut self) -> Result<Frame, FlycamError> {
        if self.position >= self.loop_len {
            return Err(FlycamError::EndOfStream);
        }
        let data = self.render(self.position);
        self.position += 1;
        Frame::new(self.width, self.height, self.channels, data)
    }

    fn restart(&mut self) -> Result<(), FlycamError> {
        self.position = 0;
        Ok(())
    }

    fn frame_interval(&self) -> Option<Duration> {
        self.frame_interval
    }

    fn describe(&self) -> String {
        format!("synthetic {}x{}x{}", self.width, self.height, self.channels)
    }
}

/// Slowly varying readings derived from a counter, so receivers can see
/// refreshes happen.
#[derive(Debug, Default)]
pub struct SyntheticMetadata {
    reads: u64,
}

impl SyntheticMetadata {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataSource for SyntheticMetadata {
    fn read_metadata(
        &mut self,
        fields: &[MetadataField],
        values: &mut [f32],
    ) -> Result<(), FlycamError> {
        self.reads += 1;
        let n = self.reads as f32;
        for (field, value) in fields.iter().zip(values.iter_mut()) {
            *value = match field.as_str() {
                "exposure" => 16_666.0,
                "gain" => 1.0 + (n % 8.0) * 0.25,
                "iso" => 100.0 * (1.0 + n % 8.0),
                "wbalance" => 5_500.0,
                "focus" => 1.5,
                _ => 0.0,
            };
        }
        Ok(())
    }
}

// ── RawFileSource ────────────────────────────────────────────────

/// Reads back-to-back raw frames (`width*height*channels` bytes each)
/// from a file. A trailing partial frame is treated as end of stream.
pub struct RawFileSource {
    path: PathBuf,
    reader: BufReader<File>,
    width: u32,
    height: u32,
    channels: u8,
    frame_len: usize,
    frame_interval: Option<Duration>,
}

impl RawFileSource {
    pub fn open(
        path: impl AsRef<Path>,
        width: u32,
        height: u32,
        channels: u8,
    ) -> Result<Self, FlycamError> {
        let path = path.as_ref().to_path_buf();
        let frame_len = width as usize * height as usize * channels as usize;
        if frame_len == 0 {
            return Err(FlycamError::InvalidConfig(format!(
                "raw file source needs a non-empty shape, got {width}x{height}x{channels}"
            )));
        }
        let file = File::open(&path).map_err(|e| {
            FlycamError::Capture(format!("cannot open {}: {e}", path.display()))
        })?;
        let len = file.metadata()?.len();
        if len < frame_len as u64 {
            return Err(FlycamError::Capture(format!(
                "{} holds {len} bytes, less than one {frame_len} byte frame",
                path.display()
            )));
        }
        Ok(Self {
            path,
            reader: BufReader::new(file),
            width,
            height,
            channels,
            frame_len,
            frame_interval: None,
        })
    }

    /// Report a frame interval matching `fps`.
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.frame_interval = (fps > 0).then(|| Duration::from_secs_f64(1.0 / fps as f64));
        self
    }
}

impl CaptureSource for RawFileSource {
    fn read_frame(&mut self) -> Result<Frame, FlycamError> {
        let mut data = vec![0u8; self.frame_len];
        match self.reader.read_exact(&mut data) {
            Ok(()) => Frame::new(self.width, self.height, self.channels, data),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(FlycamError::EndOfStream),
            Err(e) => Err(FlycamError::Capture(format!("{}: {e}", self.path.display()))),
        }
    }

    fn restart(&mut self) -> Result<(), FlycamError> {
        self.reader.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    fn frame_interval(&self) -> Option<Duration> {
        self.frame_interval
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

// ── Tests ────────────────────────────────────────────────────────
