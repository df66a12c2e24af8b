use serde::Serialize;
use slidereel_common::config::MAX_HAMMING_THRESHOLD;
use slidereel_common::frame::Frame;
use tracing::{debug, warn};

use super::ahash::{hash_frame, Fingerprint};

/// Outcome of offering one candidate frame to the [`Deduplicator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Frame differs enough from the last retained slide (or is the first).
    Retained {
        /// Distance to the previous retained fingerprint; `None` for the first slide.
        distance: Option<u32>,
        width: u32,
        height: u32,
    },
    /// Frame is within the threshold of the last retained slide.
    Duplicate { distance: u32 },
    /// Frame could not be decoded and was skipped.
    Unreadable,
}

impl Verdict {
    pub fn is_retained(&self) -> bool {
        matches!(self, Verdict::Retained { .. })
    }
}

/// Running counts for one deduplication pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DedupStats {
    pub candidates: u64,
    pub unreadable: u64,
    pub duplicates: u64,
    pub retained: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum DedupError {
    #[error("hamming threshold {0} is outside 0..={MAX_HAMMING_THRESHOLD}")]
    InvalidThreshold(u32),
    #[error("the sampler produced no candidate frames")]
    NoCandidates,
    #[error("none of the {unreadable} candidate frames could be decoded")]
    NoReadableCandidates { unreadable: u64 },
    #[error("{readable} readable candidates produced no slides")]
    NothingRetained { readable: u64 },
}

/// Streaming near-duplicate filter over an ordered candidate stream.
///
/// Each frame is compared against the most recently *retained* fingerprint
/// only. Bursts of near-identical candidates collapse to their first frame,
/// while a slide shown again later survives because it is only compared to
/// its retained predecessor.
///
/// A frame is kept when its distance is strictly greater than the threshold.
pub struct Deduplicator {
    threshold: u32,
    last_retained: Option<Fingerprint>,
    stats: DedupStats,
}

impl Deduplicator {
    pub fn new(threshold: u32) -> Result<Self, DedupError> {
        if threshold > MAX_HAMMING_THRESHOLD {
            return Err(DedupError::InvalidThreshold(threshold));
        }
        Ok(Self {
            threshold,
            last_retained: None,
            stats: DedupStats::default(),
        })
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn stats(&self) -> DedupStats {
        self.stats
    }

    /// Hash `frame` and decide whether it starts a new slide.
    pub fn offer(&mut self, frame: &Frame) -> Verdict {
        self.stats.candidates += 1;

        let hashed = match hash_frame(frame) {
            Ok(h) => h,
            Err(e) => {
                warn!(seq = frame.seq, error = %e, "unreadable frame, skipping");
                self.stats.unreadable += 1;
                return Verdict::Unreadable;
            }
        };

        match self.offer_fingerprint(hashed.fingerprint) {
            Some(distance) if distance <= self.threshold => {
                debug!(
                    seq = frame.seq,
                    distance,
                    threshold = self.threshold,
                    "duplicate of last retained slide"
                );
                Verdict::Duplicate { distance }
            }
            distance => {
                debug!(
                    seq = frame.seq,
                    ?distance,
                    threshold = self.threshold,
                    fingerprint = %hashed.fingerprint,
                    "new slide"
                );
                Verdict::Retained {
                    distance,
                    width: hashed.width,
                    height: hashed.height,
                }
            }
        }
    }

    /// Core comparison. Returns the distance to the last retained
    /// fingerprint (`None` when nothing has been retained yet) and updates
    /// the retained fingerprint when the distance exceeds the threshold.
    fn offer_fingerprint(&mut self, fp: Fingerprint) -> Option<u32> {
        match self.last_retained {
            None => {
                self.retain(fp);
                None
            }
            Some(prev) => {
                let distance = prev.distance(fp);
                if distance > self.threshold {
                    self.retain(fp);
                } else {
                    self.stats.duplicates += 1;
                }
                Some(distance)
            }
        }
    }

    fn retain(&mut self, fp: Fingerprint) {
        self.last_retained = Some(fp);
        self.stats.retained += 1;
    }

    /// Close the pass, turning an empty result into a typed failure.
    pub fn finish(&self) -> Result<DedupStats, DedupError> {
        let stats = self.stats;
        if stats.candidates == 0 {
            return Err(DedupError::NoCandidates);
        }
        let readable = stats.candidates - stats.unreadable;
        if readable == 0 {
            return Err(DedupError::NoReadableCandidates {
                unreadable: stats.unreadable,
            });
        }
        if stats.retained == 0 {
            return Err(DedupError::NothingRetained { readable });
        }
        Ok(stats)
    }
}

/// Lazy iterator adapter returned by [`dedup`].
pub struct Dedup<I> {
    inner: I,
    filter: Deduplicator,
}

impl<I> Dedup<I> {
    pub fn stats(&self) -> DedupStats {
        self.filter.stats()
    }

    /// See [`Deduplicator::finish`]. Call after the iterator is drained.
    pub fn finish(&self) -> Result<DedupStats, DedupError> {
        self.filter.finish()
    }
}

impl<I: Iterator<Item = Frame>> Iterator for Dedup<I> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        for frame in self.inner.by_ref() {
            if self.filter.offer(&frame).is_retained() {
                return Some(frame);
            }
        }
        None
    }
}

/// Keep the frames of `frames` that differ from the last kept frame by more
/// than `threshold` bits, in input order.
pub fn dedup<I>(frames: I, threshold: u32) -> Result<Dedup<I::IntoIter>, DedupError>
where
    I: IntoIterator<Item = Frame>,
{
    Ok(Dedup {
        inner: frames.into_iter(),
        filter: Deduplicator::new(threshold)?,
    })
}
