use std::path::Path;
use std::sync::Once;

use ffmpeg::util::frame::video::Video;
use ffmpeg::{format, media};
use ffmpeg_next::{self as ffmpeg};
use image::codecs::jpeg;
use image::ImageBuffer;
use tracing::debug;

use crate::error::PipelineError;

/// One JPEG-encoded still image. Its position in the clip's frame vector is
/// its ordinal in the sampled sequence.
pub type EncodedFrame = Vec<u8>;

/// Clips longer than this are rejected before any decoding work.
pub const MAX_CLIP_SECONDS: f64 = 60.0;

const SUPPORTED_EXTENSIONS: [&str; 4] = ["mp4", "mov", "avi", "mkv"];

/// Frames sampled from a video plus the metadata the analysis needs.
pub struct Clip {
    pub frames: Vec<EncodedFrame>,
    /// The sampling rate the frames were extracted at, which defines the
    /// frame-index-to-timestamp mapping downstream.
    pub sample_fps: u32,
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
}

static INIT: Once = Once::new();

pub fn init() {
    INIT.call_once(|| {
        ffmpeg::init().unwrap();
    });
}

pub fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
}

/// Cheap checks that run before any decode work.
pub fn validate_video_file(path: &Path) -> Result<(), PipelineError> {
    if !path.is_file() {
        return Err(PipelineError::Validation(format!(
            "'{}' does not exist or is not a file",
            path.display()
        )));
    }
    if !has_supported_extension(path) {
        return Err(PipelineError::Validation(format!(
            "'{}' is not a supported video file (expected one of: {})",
            path.display(),
            SUPPORTED_EXTENSIONS.join(", ")
        )));
    }
    Ok(())
}

/// Decode the video and sample JPEG frames at `target_fps`.
///
/// Fails on clips longer than [`MAX_CLIP_SECONDS`] and on clips that yield
/// no frames at all.
pub fn extract_clip(path: &Path, target_fps: u32) -> Result<Clip, PipelineError> {
    if target_fps == 0 {
        return Err(PipelineError::Validation(
            "sampling rate must be at least 1 fps".to_string(),
        ));
    }

    let mut input = format::input(&path).map_err(|e| {
        PipelineError::Validation(format!("could not open '{}': {e}", path.display()))
    })?;

    let video_stream = input
        .streams()
        .best(media::Type::Video)
        .ok_or_else(|| {
            PipelineError::Validation(format!("no video stream in '{}'", path.display()))
        })?;
    let video_stream_index = video_stream.index();
    let time_base: f64 = video_stream.time_base().into();
    let container_fps: f64 = video_stream.avg_frame_rate().into();
    let stream_duration = video_stream.duration();
    let codec_params = video_stream.parameters();

    let duration_seconds = if input.duration() > 0 {
        input.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)
    } else if stream_duration > 0 {
        stream_duration as f64 * time_base
    } else {
        0.0
    };
    if duration_seconds > MAX_CLIP_SECONDS {
        return Err(PipelineError::Validation(format!(
            "video duration ({duration_seconds:.2}s) exceeds maximum allowed ({MAX_CLIP_SECONDS:.0}s)"
        )));
    }

    let context_decoder = ffmpeg::codec::context::Context::from_parameters(codec_params)
        .map_err(|e| decode_error(path, e))?;
    let mut decoder = context_decoder
        .decoder()
        .video()
        .map_err(|e| decode_error(path, e))?;

    let mut scaler = ffmpeg::software::scaling::context::Context::get(
        decoder.format(),
        decoder.width(),
        decoder.height(),
        format::Pixel::RGB24,
        decoder.width(),
        decoder.height(),
        ffmpeg::software::scaling::Flags::BILINEAR,
    )
    .map_err(|e| decode_error(path, e))?;

    let step = 1.0 / f64::from(target_fps);
    let mut next_pts = 0.0;

    let mut frames: Vec<EncodedFrame> = Vec::new();
    let mut process_decoded_frames =
        |decoder: &mut ffmpeg::decoder::Video| -> Result<(), PipelineError> {
            let mut decoded = Video::empty();
            while decoder.receive_frame(&mut decoded).is_ok() {
                let Some(pts) = decoded.pts() else {
                    return Err(PipelineError::Validation(
                        "decoded frame carries no presentation timestamp".to_string(),
                    ));
                };
                let pts = pts as f64 * time_base;
                if pts < next_pts {
                    continue;
                }
                next_pts += step;

                let mut rgb_frame = Video::empty();
                scaler
                    .run(&decoded, &mut rgb_frame)
                    .map_err(|e| decode_error(path, e))?;
                let image_buffer = ImageBuffer::<image::Rgb<u8>, _>::from_raw(
                    rgb_frame.width(),
                    rgb_frame.height(),
                    rgb_frame.data(0).to_vec(),
                )
                .ok_or_else(|| {
                    PipelineError::Validation(
                        "failed to build image buffer from decoded frame".to_string(),
                    )
                })?;

                let mut jpeg_data = Vec::new();
                let mut encoder = jpeg::JpegEncoder::new_with_quality(&mut jpeg_data, 100);
                encoder
                    .encode(
                        &image_buffer,
                        image_buffer.width(),
                        image_buffer.height(),
                        image::ExtendedColorType::Rgb8,
                    )
                    .map_err(|e| {
                        PipelineError::Validation(format!("failed to JPEG-encode frame: {e}"))
                    })?;

                frames.push(jpeg_data);
            }
            Ok(())
        };

    for (stream, packet) in input.packets() {
        if stream.index() == video_stream_index {
            decoder
                .send_packet(&packet)
                .map_err(|e| decode_error(path, e))?;
            process_decoded_frames(&mut decoder)?;
        }
    }
    decoder.send_eof().map_err(|e| decode_error(path, e))?;
    process_decoded_frames(&mut decoder)?;

    if frames.is_empty() {
        return Err(PipelineError::Validation(
            "no frames were extracted from the video".to_string(),
        ));
    }

    debug!(
        container_fps,
        sampled = frames.len(),
        duration_seconds,
        "frame extraction complete"
    );

    Ok(Clip {
        frames,
        sample_fps: target_fps,
        duration_seconds,
        width: decoder.width(),
        height: decoder.height(),
    })
}

fn decode_error(path: &Path, e: ffmpeg::Error) -> PipelineError {
    PipelineError::Validation(format!("failed to decode '{}': {e}", path.display()))
}
