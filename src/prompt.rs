use std::fmt::Write;

use crate::batching::{BatchObservation, FrameBatch};

/// Prompt for a clip that fits in one inference call. The model sees every
/// frame at once, so it is told to use the full temporal context.
pub fn whole_clip_prompt(frame_count: usize, fps: u32, task: &str) -> String {
    let duration = frame_count as f64 / f64::from(fps);
    format!(
        "You are analyzing a video sequence of {frame_count} consecutive frames, sampled at {fps} fps. \
         The frames are in chronological order, representing approximately {duration:.2} seconds of video. \
         Since you are seeing all frames together, you have complete temporal context to analyze motion and changes. \
         Focus on identifying motion and changes between frames, and analyze how objects and people move and interact over time. \
         You are not allowed to ask the user for more information, you are not allowed to hallucinate, and you are not allowed to make up information.\
         \n\nThe user wants you to: {task}"
    )
}

/// Prompt for one segment of a multi-batch run.
///
/// The model sees no frames from other segments, so the prompt must be
/// self-contained: it states this segment's frame and time range, and the
/// only continuity mechanism is the immediately preceding segment's
/// observations. Carrying a single observation keeps prompt growth constant
/// no matter how many batches the clip needs.
pub fn segment_prompt(
    batch: &FrameBatch<'_>,
    fps: u32,
    previous: Option<&BatchObservation>,
    task: &str,
) -> String {
    let start = batch.start_seconds(fps);
    let end = batch.end_seconds(fps);

    let mut prompt = format!(
        "You are analyzing a sequence of {} consecutive frames ({} to {}) from a video sampled at {fps} fps, \
         representing video timestamps {start:.2}s to {end:.2}s. \
         Focus on identifying motion and temporal changes within this specific segment. \
         Use visual features such as position and posture to locate the subjects across the frames. \
         DO NOT GUESS OR HALLUCINATE. SIMPLY REPORT WHAT YOU SEE. ONLY REPORT WHAT YOU SEE IN THE FRAMES.",
        batch.len(),
        batch.start_index + 1,
        batch.end_index() + 1,
    );

    if let Some(prev) = previous {
        let _ = write!(
            prompt,
            "\n\nObservations from the immediately preceding segment (Time {:.2}s-{:.2}s): {}\n",
            prev.start_seconds, prev.end_seconds, prev.text,
        );
    }

    let _ = write!(
        prompt,
        "\n\nThe user wants you to analyze this current segment ({start:.2}s-{end:.2}s) based on this prompt: {task}"
    );

    prompt
}

/// Prompt for the final synthesis call. Takes every segment's labeled
/// observations and asks for one coherent chronological narrative; the call
/// itself carries no images.
pub fn synthesis_prompt(
    frame_count: usize,
    fps: u32,
    observations: &[BatchObservation],
    task: &str,
) -> String {
    let duration = frame_count as f64 / f64::from(fps);

    let segment_summaries = observations
        .iter()
        .enumerate()
        .map(|(i, obs)| {
            format!(
                "Segment {} (Time {:.2}s - {:.2}s): {}",
                i + 1,
                obs.start_seconds,
                obs.end_seconds,
                obs.text,
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "I have analyzed {frame_count} sequential frames from a video sampled at {fps} fps, \
representing approximately {duration:.2} seconds of video content.

Here are my detailed observations from analyzing the video in {segment_count} segments:

{segment_summaries}

Based *only* on the detailed observations provided above for each time segment, generate a final, \
comprehensive response to the user's prompt: '{task}'.

Please structure your response as follows:
1. **Chronological Timeline:** Create a clear, structured timeline of events using the provided \
timestamps (e.g., \"Time 0.0s - 3.1s:\"). Describe the key actions, movements, and changes occurring \
within each time segment based *only* on the segment summaries. Do NOT refer back to frame numbers.
2. **Key Event Highlights (optional but encouraged):** Identify and list 1-3 of the most significant \
events or transitions observed in the video, along with their approximate start times.
3. **Overall Summary:** Briefly summarize the main narrative or activity depicted across the entire \
analyzed duration, synthesizing the timeline information.
4. Character names may be supplied in the prompt; if so, use them in the response ONLY if they are \
actually seen in the segment observations.

Focus on accurately reflecting the information from the segment summaries using the time references. \
Ensure the timeline flows logically based on the sequential observations. Adhere strictly to the \
observations provided in the segments above. This is NOT interactive; you are not allowed to ask the \
user for more information.",
        segment_count = observations.len(),
    )
}
