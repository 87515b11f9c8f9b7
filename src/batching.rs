use crate::capture::EncodedFrame;

pub const DEFAULT_BATCH_CEILING: usize = 32;

/// Smallest batch worth sending; shorter segments carry too little temporal
/// context to describe motion.
const MIN_BATCH_SIZE: usize = 9;

/// Pick how many frames go into each inference call.
///
/// A clip that fits under the ceiling is sent whole, which keeps the full
/// temporal context in one model call. Longer clips prefer the largest batch
/// size in `[9, ceiling]` that divides the frame count evenly, so the final
/// batch is never a short, context-poor tail. Without an even divisor the
/// ceiling itself is used.
pub fn optimal_batch_size(total_frames: usize, ceiling: usize) -> usize {
    if total_frames <= ceiling {
        return total_frames;
    }

    if let Some(divisor) = (MIN_BATCH_SIZE..=ceiling)
        .rev()
        .find(|candidate| total_frames % candidate == 0)
    {
        return divisor;
    }

    if ceiling >= MIN_BATCH_SIZE {
        return ceiling;
    }

    // Unreachable for ceilings inside the candidate range, but degenerate
    // ceilings below it still need an answer.
    ceiling.min(total_frames)
}

/// A contiguous slice of the clip's frame sequence sent in one inference
/// call. Indices are 0-based positions in the extracted sequence.
#[derive(Debug)]
pub struct FrameBatch<'a> {
    pub start_index: usize,
    pub frames: &'a [EncodedFrame],
}

impl FrameBatch<'_> {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn end_index(&self) -> usize {
        self.start_index + self.frames.len().saturating_sub(1)
    }

    pub fn start_seconds(&self, fps: u32) -> f64 {
        self.start_index as f64 / f64::from(fps)
    }

    pub fn end_seconds(&self, fps: u32) -> f64 {
        self.end_index() as f64 / f64::from(fps)
    }
}

/// Split the frame sequence into ordered, gap-free, non-overlapping batches.
/// The last batch may be shorter than `batch_size`.
pub fn partition_frames(frames: &[EncodedFrame], batch_size: usize) -> Vec<FrameBatch<'_>> {
    frames
        .chunks(batch_size)
        .enumerate()
        .map(|(i, chunk)| FrameBatch {
            start_index: i * batch_size,
            frames: chunk,
        })
        .collect()
}

/// The text a backend returned for one batch, tied to that batch's time
/// range. Carried into the next batch's prompt and into the final synthesis.
#[derive(Debug, Clone)]
pub struct BatchObservation {
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(count: usize) -> Vec<EncodedFrame> {
        (0..count).map(|i| vec![i as u8]).collect()
    }

    #[test]
    fn short_clips_are_a_single_batch() {
        for count in [1, 2, 10, 31, 32] {
            assert_eq!(optimal_batch_size(count, DEFAULT_BATCH_CEILING), count);
        }
    }

    #[test]
    fn long_clips_stay_within_bounds() {
        for count in 33..=400 {
            let size = optimal_batch_size(count, DEFAULT_BATCH_CEILING);
            assert!((9..=32).contains(&size), "count {count} gave size {size}");

            let best_divisor = (9..=32usize).rev().find(|c| count % c == 0);
            if let Some(divisor) = best_divisor {
                assert_eq!(size, divisor, "count {count} should partition evenly");
            }
        }
    }

    #[test]
    fn largest_even_divisor_is_preferred() {
        // 50 = 2 * 25, 64 = 2 * 32, 90 = 3 * 30, 33 = 3 * 11, 48 = 2 * 24.
        assert_eq!(optimal_batch_size(50, 32), 25);
        assert_eq!(optimal_batch_size(64, 32), 32);
        assert_eq!(optimal_batch_size(90, 32), 30);
        assert_eq!(optimal_batch_size(33, 32), 11);
        assert_eq!(optimal_batch_size(48, 32), 24);
    }

    #[test]
    fn frame_counts_with_no_divisor_use_the_ceiling() {
        // Primes above the ceiling have no divisor in [9, 32].
        assert_eq!(optimal_batch_size(37, 32), 32);
        assert_eq!(optimal_batch_size(101, 32), 32);
    }

    #[test]
    fn planner_is_deterministic() {
        for count in [10, 50, 101, 240] {
            assert_eq!(
                optimal_batch_size(count, DEFAULT_BATCH_CEILING),
                optimal_batch_size(count, DEFAULT_BATCH_CEILING)
            );
        }
    }

    #[test]
    fn degenerate_ceiling_falls_back() {
        assert_eq!(optimal_batch_size(12, 5), 5);
    }

    #[test]
    fn partition_reproduces_the_original_sequence() {
        let all = frames(50);
        let batches = partition_frames(&all, 20);

        assert_eq!(batches.len(), 3);
        assert_eq!(
            batches.iter().map(FrameBatch::len).collect::<Vec<_>>(),
            vec![20, 20, 10]
        );

        let rebuilt: Vec<EncodedFrame> = batches
            .iter()
            .flat_map(|b| b.frames.iter().cloned())
            .collect();
        assert_eq!(rebuilt, all);
    }

    #[test]
    fn partition_indices_are_contiguous() {
        let all = frames(50);
        let batches = partition_frames(&all, 20);

        assert_eq!(batches[0].start_index, 0);
        assert_eq!(batches[0].end_index(), 19);
        assert_eq!(batches[1].start_index, 20);
        assert_eq!(batches[1].end_index(), 39);
        assert_eq!(batches[2].start_index, 40);
        assert_eq!(batches[2].end_index(), 49);
    }

    #[test]
    fn batch_time_ranges_derive_from_indices() {
        let all = frames(50);
        let batches = partition_frames(&all, 20);

        assert_eq!(batches[1].start_seconds(8), 2.5);
        assert_eq!(batches[1].end_seconds(8), 4.875);
        assert_eq!(batches[2].end_seconds(8), 6.125);
    }
}
