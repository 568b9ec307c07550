use std::error::Error;
use std::path::Path;

use ffmpeg_next as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling;
use ffmpeg::util::frame::video::Video as RawFrame;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_reader::VideoReader;

type FrameResult = Result<Frame, Box<dyn Error>>;

/// [`VideoReader`] backed by libavformat and libavcodec.
///
/// Only the best video stream of the container is decoded. Frames come out
/// as packed RGB24 in decode order.
#[derive(Default)]
pub struct FfmpegReader {
    opened: Option<OpenedInput>,
}

struct OpenedInput {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
}

// Safety: a reader is owned by one use case and never shared; the ffmpeg
// contexts it holds are only touched through `&mut self`.
unsafe impl Send for FfmpegReader {}

impl FfmpegReader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VideoReader for FfmpegReader {
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn Error>> {
        self.close();
        ffmpeg::init()?;

        let input = ffmpeg::format::input(path)?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| format!("{} has no video stream", path.display()))?;
        let params = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = params.decoder().video()?;

        let metadata = VideoMetadata {
            width: decoder.width(),
            height: decoder.height(),
            fps: frame_rate(stream.rate()),
            total_frames: usize::try_from(stream.frames()).unwrap_or(0),
            source_path: Some(path.to_path_buf()),
        };
        let stream_index = stream.index();

        self.opened = Some(OpenedInput {
            input,
            stream_index,
        });
        Ok(metadata)
    }

    fn frames(&mut self) -> Box<dyn Iterator<Item = FrameResult> + '_> {
        let Some(opened) = self.opened.as_mut() else {
            return Box::new(std::iter::once(Err("no video is open".into())));
        };
        match DecodedFrames::start(opened) {
            Ok(frames) => Box::new(frames),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    fn close(&mut self) {
        self.opened = None;
    }
}

fn frame_rate(rate: ffmpeg::Rational) -> f64 {
    if rate.denominator() == 0 {
        0.0
    } else {
        f64::from(rate)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Reading,
    Draining,
    Finished,
}

/// Pull-based decoder over the opened stream.
///
/// Frames are decoded on demand, so a sampler that only keeps three frames
/// never holds more than one decoded picture at a time.
struct DecodedFrames<'a> {
    input: &'a mut ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::decoder::Video,
    converter: Option<Converter>,
    next_index: usize,
    state: DecodeState,
}

/// RGB24 converter for one source geometry; rebuilt when the stream
/// changes resolution or pixel format mid-file.
struct Converter {
    context: scaling::Context,
    format: Pixel,
    width: u32,
    height: u32,
}

impl<'a> DecodedFrames<'a> {
    fn start(opened: &'a mut OpenedInput) -> Result<Self, Box<dyn Error>> {
        let stream_index = opened.stream_index;
        let parameters = opened
            .input
            .stream(stream_index)
            .ok_or("video stream vanished after open")?
            .parameters();
        let decoder = ffmpeg::codec::context::Context::from_parameters(parameters)?
            .decoder()
            .video()?;

        Ok(Self {
            input: &mut opened.input,
            stream_index,
            decoder,
            converter: None,
            next_index: 0,
            state: DecodeState::Reading,
        })
    }

    /// Takes one picture out of the decoder if it has one ready.
    fn receive(&mut self) -> Option<FrameResult> {
        let mut picture = RawFrame::empty();
        self.decoder.receive_frame(&mut picture).ok()?;
        Some(self.convert(&picture))
    }

    fn convert(&mut self, picture: &RawFrame) -> FrameResult {
        let (format, width, height) = (picture.format(), picture.width(), picture.height());
        let reusable = matches!(
            &self.converter,
            Some(c) if c.format == format && c.width == width && c.height == height
        );
        if !reusable {
            let context = scaling::Context::get(
                format,
                width,
                height,
                Pixel::RGB24,
                width,
                height,
                scaling::Flags::BILINEAR,
            )?;
            self.converter = Some(Converter {
                context,
                format,
                width,
                height,
            });
        }

        let mut rgb = RawFrame::empty();
        if let Some(converter) = self.converter.as_mut() {
            converter.context.run(picture, &mut rgb)?;
        }

        let frame = Frame::from_rgb(packed_rgb(&rgb, width, height), width, height, self.next_index)
            .ok_or("converted picture does not match its dimensions")?;
        self.next_index += 1;
        Ok(frame)
    }

    /// Feeds the next packet of our stream to the decoder. Returns false
    /// once the container is exhausted.
    fn feed(&mut self) -> bool {
        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            // A corrupt packet is dropped; the clip just decodes short.
            if self.decoder.send_packet(&packet).is_ok() {
                return true;
            }
        }
        false
    }
}

impl Iterator for DecodedFrames<'_> {
    type Item = FrameResult;

    fn next(&mut self) -> Option<FrameResult> {
        loop {
            match self.state {
                DecodeState::Finished => return None,
                DecodeState::Draining => {
                    let frame = self.receive();
                    if frame.is_none() {
                        self.state = DecodeState::Finished;
                    }
                    return frame;
                }
                DecodeState::Reading => {
                    if let Some(frame) = self.receive() {
                        return Some(frame);
                    }
                    if !self.feed() {
                        // A failed flush only loses the buffered tail.
                        let _ = self.decoder.send_eof();
                        self.state = DecodeState::Draining;
                    }
                }
            }
        }
    }
}

/// Strips the per-row stride padding ffmpeg leaves after each RGB row.
fn packed_rgb(rgb: &RawFrame, width: u32, height: u32) -> Vec<u8> {
    let row_bytes = width as usize * 3;
    let stride = rgb.stride(0);
    rgb.data(0)
        .chunks(stride)
        .take(height as usize)
        .flat_map(|row| &row[..row_bytes])
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writes an MPEG-4 clip of flat frames whose luma steps by 40 per
    /// frame. Planes are filled directly in YUV420P.
    fn encode_flat_clip(path: &Path, frame_count: usize, width: u32, height: u32) {
        const FPS: i32 = 25;
        let time_base = ffmpeg::Rational(1, FPS);
        ffmpeg::init().unwrap();

        let mut output = ffmpeg::format::output(path).unwrap();
        let needs_global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);
        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MPEG4).unwrap();
        output.add_stream(Some(codec)).unwrap();

        let mut setup = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .unwrap();
        setup.set_width(width);
        setup.set_height(height);
        setup.set_format(Pixel::YUV420P);
        setup.set_time_base(time_base);
        setup.set_frame_rate(Some(ffmpeg::Rational(FPS, 1)));
        if needs_global_header {
            setup.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }
        let mut encoder = setup.open_with(ffmpeg::Dictionary::new()).unwrap();
        output.stream_mut(0).unwrap().set_parameters(&encoder);
        output.write_header().unwrap();
        let stream_time_base = output.stream(0).unwrap().time_base();

        let mut write_pending = |encoder: &mut ffmpeg::encoder::Video| {
            let mut packet = ffmpeg::Packet::empty();
            while encoder.receive_packet(&mut packet).is_ok() {
                packet.set_stream(0);
                packet.rescale_ts(time_base, stream_time_base);
                packet.write_interleaved(&mut output).unwrap();
            }
        };

        for n in 0..frame_count {
            let mut picture = RawFrame::new(Pixel::YUV420P, width, height);
            picture.data_mut(0).fill(((n * 40) % 220) as u8 + 16);
            picture.data_mut(1).fill(128);
            picture.data_mut(2).fill(128);
            picture.set_pts(Some(n as i64));
            encoder.send_frame(&picture).unwrap();
            write_pending(&mut encoder);
        }
        encoder.send_eof().unwrap();
        write_pending(&mut encoder);
        output.write_trailer().unwrap();
    }

    fn clip(dir: &tempfile::TempDir, frame_count: usize) -> std::path::PathBuf {
        let path = dir.path().join("clip.mp4");
        encode_flat_clip(&path, frame_count, 160, 120);
        path
    }

    #[test]
    fn test_open_reports_geometry_and_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = clip(&dir, 5);

        let mut reader = FfmpegReader::new();
        let meta = reader.open(&path).unwrap();

        assert_eq!((meta.width, meta.height), (160, 120));
        assert!(meta.fps > 0.0);
        assert_eq!(meta.source_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_open_missing_file_fails() {
        let mut reader = FfmpegReader::new();
        assert!(reader.open(Path::new("/nonexistent/clip.mp4")).is_err());
    }

    #[test]
    fn test_open_non_video_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.mp4");
        std::fs::write(&path, b"plain text pretending to be a clip").unwrap();

        assert!(FfmpegReader::new().open(&path).is_err());
    }

    #[test]
    fn test_every_frame_decodes_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = clip(&dir, 5);
        let mut reader = FfmpegReader::new();
        reader.open(&path).unwrap();

        let frames: Vec<Frame> = reader.frames().collect::<Result<_, _>>().unwrap();

        let indices: Vec<usize> = frames.iter().map(Frame::index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert!(frames
            .iter()
            .all(|f| f.data().len() == 160 * 120 * 3));
    }

    #[test]
    fn test_reopen_restarts_at_first_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = clip(&dir, 3);
        let mut reader = FfmpegReader::new();

        reader.open(&path).unwrap();
        assert_eq!(reader.frames().count(), 3);
        reader.open(&path).unwrap();
        let first = reader.frames().next().unwrap().unwrap();

        assert_eq!(first.index(), 0);
    }

    #[test]
    fn test_frames_before_open_is_an_error() {
        let mut reader = FfmpegReader::new();
        assert!(reader.frames().next().unwrap().is_err());
    }

    #[test]
    fn test_close_twice_leaves_reader_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = clip(&dir, 1);
        let mut reader = FfmpegReader::new();
        reader.open(&path).unwrap();

        reader.close();
        reader.close();

        assert!(reader.frames().next().unwrap().is_err());
    }
}
