use std::path::Path;

use thiserror::Error;

use crate::shared::frame::Frame;
use crate::shared::frame_position::FramePosition;
use crate::video::domain::video_reader::VideoReader;

#[derive(Error, Debug)]
pub enum SampleError {
    #[error("fails to open the video: {0}")]
    Open(String),
    #[error("fails to decode frame: {0}")]
    Decode(String),
    #[error("fails to get {position} frame (index {index} of {total})")]
    MissingFrame {
        position: FramePosition,
        index: usize,
        total: usize,
    },
    #[error("first frame is {first:?} but last frame is {last:?}")]
    DimensionMismatch { first: (u32, u32), last: (u32, u32) },
}

/// First, middle and last frame of one video plus its frame count.
#[derive(Clone, Debug)]
pub struct FrameTriple {
    pub first: Frame,
    pub middle: Frame,
    pub last: Frame,
    pub total_frames: usize,
}

impl FrameTriple {
    pub fn frames(&self) -> [&Frame; 3] {
        [&self.first, &self.middle, &self.last]
    }
}

/// Pulls the three representative frames out of a video.
///
/// Frames are decoded sequentially and only the ones at `0`, `total / 2`
/// and `total - 1` are kept. When the container does not record a frame
/// count, one extra decoding pass counts the frames first.
pub struct FrameSampler {
    reader: Box<dyn VideoReader>,
}

impl FrameSampler {
    pub fn new(reader: Box<dyn VideoReader>) -> Self {
        Self { reader }
    }

    pub fn sample(&mut self, path: &Path) -> Result<FrameTriple, SampleError> {
        let result = self.sample_open(path);
        self.reader.close();
        result
    }

    fn sample_open(&mut self, path: &Path) -> Result<FrameTriple, SampleError> {
        let metadata = self
            .reader
            .open(path)
            .map_err(|e| SampleError::Open(e.to_string()))?;

        let total_frames = if metadata.total_frames > 0 {
            metadata.total_frames
        } else {
            let counted = self.count_frames()?;
            self.reader
                .open(path)
                .map_err(|e| SampleError::Open(e.to_string()))?;
            counted
        };

        self.pick(total_frames)
    }

    fn count_frames(&mut self) -> Result<usize, SampleError> {
        let mut count = 0;
        for frame in self.reader.frames() {
            frame.map_err(|e| SampleError::Decode(e.to_string()))?;
            count += 1;
        }
        Ok(count)
    }

    fn pick(&mut self, total_frames: usize) -> Result<FrameTriple, SampleError> {
        let targets = FramePosition::ALL.map(|p| p.frame_index(total_frames));
        let mut picked: [Option<Frame>; 3] = [None, None, None];

        if total_frames > 0 {
            for frame in self.reader.frames() {
                let frame = frame.map_err(|e| SampleError::Decode(e.to_string()))?;
                for (slot, target) in picked.iter_mut().zip(targets) {
                    if frame.index() == target {
                        *slot = Some(frame.clone());
                    }
                }
                if frame.index() >= targets[2] {
                    break;
                }
            }
        }

        let [first, middle, last] = picked;
        let missing = |position: FramePosition| SampleError::MissingFrame {
            position,
            index: position.frame_index(total_frames),
            total: total_frames,
        };
        let first = first.ok_or_else(|| missing(FramePosition::Start))?;
        let last = last.ok_or_else(|| missing(FramePosition::End))?;
        if !first.same_dimensions(&last) {
            return Err(SampleError::DimensionMismatch {
                first: (first.width(), first.height()),
                last: (last.width(), last.height()),
            });
        }
        let middle = middle.ok_or_else(|| missing(FramePosition::Middle))?;

        Ok(FrameTriple {
            first,
            middle,
            last,
            total_frames,
        })
    }
}
