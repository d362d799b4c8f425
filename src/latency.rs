//! Latency bookkeeping on top of [`BoundedExtremeQueue`].
//!
//! A [`LatencyRecorder`] keeps the fastest and slowest samples of a run in two bounded
//! queues and counts every sample into a fixed-width histogram, so memory stays
//! proportional to the configured sizes rather than to the number of samples.

use std::io::BufRead;
use std::time::Duration;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::priority_queue::{BoundedExtremeQueue, Orientation};

/// Upper bound on the number of histogram buckets a config may ask for.
pub const MAX_BUCKETS: usize = 1 << 20;

/// Histogram range and head/tail sizes.
///
/// Field names on the wire follow the benchmark request format
/// (`latency_bucket_lower`, `latency_head_size`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
    #[serde(rename = "latency_bucket_lower")]
    pub bucket_lower: u64,
    #[serde(rename = "latency_bucket_upper")]
    pub bucket_upper: u64,
    #[serde(rename = "latency_bucket_granularity")]
    pub bucket_granularity: u64,
    #[serde(rename = "latency_head_size")]
    pub head_size: usize,
    #[serde(rename = "latency_tail_size")]
    pub tail_size: usize,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            bucket_lower: 0,
            bucket_upper: 3000,
            bucket_granularity: 10,
            head_size: 10,
            tail_size: 10,
        }
    }
}

impl LatencyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.bucket_lower >= self.bucket_upper {
            return Err(Error::InvalidBucketRange {
                lower: self.bucket_lower,
                upper: self.bucket_upper,
            });
        }
        if self.bucket_granularity == 0 {
            return Err(Error::ZeroGranularity);
        }
        let count = self.raw_bucket_count();
        if usize::try_from(count).map_or(true, |count| count > MAX_BUCKETS) {
            return Err(Error::TooManyBuckets {
                count,
                max: MAX_BUCKETS,
            });
        }
        Ok(())
    }

    /// Number of histogram buckets of a validated config; the last one may be narrower
    /// than the granularity.
    pub fn bucket_count(&self) -> usize {
        usize::try_from(self.raw_bucket_count()).unwrap_or(usize::MAX)
    }

    fn raw_bucket_count(&self) -> u64 {
        (self.bucket_upper - self.bucket_lower).div_ceil(self.bucket_granularity)
    }

    fn same_layout(&self, other: &LatencyConfig) -> bool {
        self.bucket_lower == other.bucket_lower
            && self.bucket_upper == other.bucket_upper
            && self.bucket_granularity == other.bucket_granularity
    }

    fn describe_layout(&self) -> String {
        format!(
            "[{}, {}) step {}",
            self.bucket_lower, self.bucket_upper, self.bucket_granularity
        )
    }
}

/// One non-empty histogram bucket, covering `[lower, upper)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyBucket {
    pub lower: u64,
    pub upper: u64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: u64,
    pub min: Option<u64>,
    pub max: Option<u64>,
    pub mean: Option<f64>,
    /// Fastest samples, ascending.
    pub head: Vec<u64>,
    /// Slowest samples, descending.
    pub tail: Vec<u64>,
    pub buckets: Vec<LatencyBucket>,
    pub below_range: u64,
    pub above_range: u64,
}

/// Bounded-memory latency recorder.
///
/// Like the queues it is built on, a recorder is meant to be owned by a single task.
/// Concurrent producers keep one recorder each and combine them with
/// [`absorb`](Self::absorb) when they are done.
#[derive(Debug, Clone)]
pub struct LatencyRecorder {
    config: LatencyConfig,
    head: BoundedExtremeQueue<u64>,
    tail: BoundedExtremeQueue<u64>,
    buckets: Vec<u64>,
    below_range: u64,
    above_range: u64,
    count: u64,
    sum: u128,
    min: Option<u64>,
    max: Option<u64>,
}

impl LatencyRecorder {
    pub fn new(config: LatencyConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            "latency recorder: buckets {} ({}), head {}, tail {}",
            config.bucket_count(),
            config.describe_layout(),
            config.head_size,
            config.tail_size
        );
        Ok(Self {
            config,
            head: BoundedExtremeQueue::new(config.head_size, Orientation::Min),
            tail: BoundedExtremeQueue::new(config.tail_size, Orientation::Max),
            buckets: vec![0; config.bucket_count()],
            below_range: 0,
            above_range: 0,
            count: 0,
            sum: 0,
            min: None,
            max: None,
        })
    }

    pub fn config(&self) -> &LatencyConfig {
        &self.config
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn record(&mut self, sample: u64) {
        self.head.add(sample);
        self.tail.add(sample);

        if sample < self.config.bucket_lower {
            self.below_range += 1;
        } else if sample >= self.config.bucket_upper {
            self.above_range += 1;
        } else {
            let offset = sample - self.config.bucket_lower;
            let idx = (offset / self.config.bucket_granularity) as usize;
            self.buckets[idx] += 1;
        }

        self.count += 1;
        self.sum += u128::from(sample);
        self.min = Some(self.min.map_or(sample, |m| m.min(sample)));
        self.max = Some(self.max.map_or(sample, |m| m.max(sample)));
    }

    /// Records a duration in whole microseconds, saturating at `u64::MAX`.
    pub fn record_duration(&mut self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.record(micros);
    }

    /// Reads whitespace-separated integer samples until EOF. Returns how many were recorded.
    pub fn record_from_reader<R: BufRead>(&mut self, reader: R) -> Result<usize> {
        let mut recorded = 0;
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            for token in line.split_whitespace() {
                let sample = token.parse::<u64>().map_err(|_| Error::ParseSample {
                    line: idx + 1,
                    value: token.to_string(),
                })?;
                self.record(sample);
                recorded += 1;
            }
        }
        trace!("recorded {} samples from reader", recorded);
        Ok(recorded)
    }

    /// Folds another recorder's samples into this one.
    ///
    /// Retained head/tail values are re-added one by one, so the result keeps this
    /// recorder's head and tail sizes. Both recorders must share a bucket layout.
    pub fn absorb(&mut self, other: &LatencyRecorder) -> Result<()> {
        if !self.config.same_layout(&other.config) {
            return Err(Error::BucketLayoutMismatch {
                ours: self.config.describe_layout(),
                theirs: other.config.describe_layout(),
            });
        }

        self.head.extend(other.head.iter().copied());
        self.tail.extend(other.tail.iter().copied());
        for (mine, theirs) in self.buckets.iter_mut().zip(&other.buckets) {
            *mine += theirs;
        }
        self.below_range += other.below_range;
        self.above_range += other.above_range;
        self.count += other.count;
        self.sum += other.sum;
        self.min = match (self.min, other.min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };

        debug!("absorbed {} samples, {} total", other.count, self.count);
        Ok(())
    }

    /// Changes the head/tail sizes. Shrinking takes effect immediately.
    pub fn resize(&mut self, head_size: usize, tail_size: usize) {
        debug!(
            "resizing head {} -> {}, tail {} -> {}",
            self.config.head_size, head_size, self.config.tail_size, tail_size
        );
        self.config.head_size = head_size;
        self.config.tail_size = tail_size;
        self.head.set_limit(head_size);
        self.head.shrink();
        self.tail.set_limit(tail_size);
        self.tail.shrink();
    }

    pub fn summary(&self) -> LatencySummary {
        let step = self.config.bucket_granularity;
        let buckets = self
            .buckets
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count > 0)
            .map(|(i, &count)| {
                let lower = self.config.bucket_lower + i as u64 * step;
                LatencyBucket {
                    lower,
                    upper: lower.saturating_add(step).min(self.config.bucket_upper),
                    count,
                }
            })
            .collect();

        LatencySummary {
            count: self.count,
            min: self.min,
            max: self.max,
            mean: (self.count > 0).then(|| self.sum as f64 / self.count as f64),
            head: self.head.clone().into_sorted_vec(),
            tail: self.tail.clone().into_sorted_vec(),
            buckets,
            below_range: self.below_range,
            above_range: self.above_range,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::io::Cursor;

    fn config(head_size: usize, tail_size: usize) -> LatencyConfig {
        LatencyConfig {
            bucket_lower: 0,
            bucket_upper: 100,
            bucket_granularity: 10,
            head_size,
            tail_size,
        }
    }

    #[test]
    fn test_default_config() {
        let config = LatencyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bucket_count(), 300);
    }

    #[test]
    fn test_invalid_config() {
        let mut bad = config(1, 1);
        bad.bucket_lower = 100;
        assert!(matches!(
            LatencyRecorder::new(bad),
            Err(Error::InvalidBucketRange { lower: 100, upper: 100 })
        ));

        let mut bad = config(1, 1);
        bad.bucket_granularity = 0;
        assert!(matches!(LatencyRecorder::new(bad), Err(Error::ZeroGranularity)));
    }

    #[test]
    fn test_too_many_buckets() {
        let config = LatencyConfig {
            bucket_upper: u64::MAX,
            bucket_granularity: 1,
            ..config(1, 1)
        };
        match LatencyRecorder::new(config) {
            Err(Error::TooManyBuckets { count, max }) => {
                assert_eq!(count, u64::MAX);
                assert_eq!(max, MAX_BUCKETS);
            }
            other => panic!("expected too many buckets, got {:?}", other),
        }

        let at_cap = LatencyConfig {
            bucket_upper: MAX_BUCKETS as u64,
            bucket_granularity: 1,
            ..self::config(1, 1)
        };
        assert!(at_cap.validate().is_ok());
        let over_cap = LatencyConfig {
            bucket_upper: MAX_BUCKETS as u64 + 1,
            ..at_cap
        };
        assert!(matches!(over_cap.validate(), Err(Error::TooManyBuckets { .. })));
    }

    #[test]
    fn test_last_bucket_near_u64_max() {
        let config = LatencyConfig {
            bucket_lower: 0,
            bucket_upper: u64::MAX,
            bucket_granularity: 1 << 63,
            head_size: 1,
            tail_size: 1,
        };
        assert_eq!(config.bucket_count(), 2);

        let mut recorder = LatencyRecorder::new(config).unwrap();
        recorder.record(u64::MAX - 1);
        recorder.record(u64::MAX);

        let summary = recorder.summary();
        assert_eq!(
            summary.buckets,
            vec![LatencyBucket { lower: 1 << 63, upper: u64::MAX, count: 1 }]
        );
        assert_eq!(summary.above_range, 1);
    }

    #[test]
    fn test_partial_last_bucket() {
        let config = LatencyConfig {
            bucket_lower: 5,
            bucket_upper: 30,
            bucket_granularity: 10,
            head_size: 1,
            tail_size: 1,
        };
        assert_eq!(config.bucket_count(), 3);

        let mut recorder = LatencyRecorder::new(config).unwrap();
        recorder.record(29);
        let summary = recorder.summary();
        assert_eq!(
            summary.buckets,
            vec![LatencyBucket { lower: 25, upper: 30, count: 1 }]
        );
    }

    #[test]
    fn test_record_head_tail_and_buckets() {
        let mut recorder = LatencyRecorder::new(config(3, 2)).unwrap();
        for sample in [42, 7, 99, 100, 13, 250, 8, 55] {
            recorder.record(sample);
        }

        let summary = recorder.summary();
        assert_eq!(summary.count, 8);
        assert_eq!(summary.min, Some(7));
        assert_eq!(summary.max, Some(250));
        assert_eq!(summary.mean, Some(574.0 / 8.0));
        assert_eq!(summary.head, vec![7, 8, 13]);
        assert_eq!(summary.tail, vec![250, 100]);
        assert_eq!(summary.below_range, 0);
        assert_eq!(summary.above_range, 2);
        assert_eq!(
            summary.buckets,
            vec![
                LatencyBucket { lower: 0, upper: 10, count: 2 },
                LatencyBucket { lower: 10, upper: 20, count: 1 },
                LatencyBucket { lower: 40, upper: 50, count: 1 },
                LatencyBucket { lower: 50, upper: 60, count: 1 },
                LatencyBucket { lower: 90, upper: 100, count: 1 },
            ]
        );
    }

    #[test]
    fn test_below_range() {
        let mut recorder = LatencyRecorder::new(LatencyConfig {
            bucket_lower: 50,
            ..config(1, 1)
        })
        .unwrap();
        recorder.record(10);
        recorder.record(60);

        let summary = recorder.summary();
        assert_eq!(summary.below_range, 1);
        assert_eq!(summary.buckets.len(), 1);
    }

    #[test]
    fn test_empty_summary() {
        let recorder = LatencyRecorder::new(config(4, 4)).unwrap();
        let summary = recorder.summary();
        assert_eq!(summary.count, 0);
        assert_eq!(summary.mean, None);
        assert_eq!(summary.min, None);
        assert!(summary.head.is_empty());
        assert!(summary.tail.is_empty());
        assert!(summary.buckets.is_empty());
    }

    #[test]
    fn test_record_duration() {
        let mut recorder = LatencyRecorder::new(config(1, 1)).unwrap();
        recorder.record_duration(Duration::from_millis(2));
        recorder.record_duration(Duration::MAX);

        let summary = recorder.summary();
        assert_eq!(summary.head, vec![2_000]);
        assert_eq!(summary.tail, vec![u64::MAX]);
    }

    #[test]
    fn test_record_from_reader() {
        let mut recorder = LatencyRecorder::new(config(2, 2)).unwrap();
        let input = Cursor::new("5 17\n\n  90\n3\n");
        assert_eq!(recorder.record_from_reader(input).unwrap(), 4);
        assert_eq!(recorder.summary().head, vec![3, 5]);
    }

    #[test]
    fn test_record_from_reader_rejects_garbage() {
        let mut recorder = LatencyRecorder::new(config(2, 2)).unwrap();
        let input = Cursor::new("5\n12 fast\n");
        match recorder.record_from_reader(input) {
            Err(Error::ParseSample { line, value }) => {
                assert_eq!(line, 2);
                assert_eq!(value, "fast");
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_resize_shrinks_immediately() {
        let mut recorder = LatencyRecorder::new(config(5, 5)).unwrap();
        for sample in 0..20 {
            recorder.record(sample);
        }
        recorder.resize(2, 1);

        let summary = recorder.summary();
        assert_eq!(summary.head, vec![0, 1]);
        assert_eq!(summary.tail, vec![19]);
        assert_eq!(recorder.config().head_size, 2);
    }

    #[test]
    fn test_absorb_layout_mismatch() {
        let mut a = LatencyRecorder::new(config(1, 1)).unwrap();
        let b = LatencyRecorder::new(LatencyConfig {
            bucket_granularity: 5,
            ..config(1, 1)
        })
        .unwrap();
        assert!(matches!(a.absorb(&b), Err(Error::BucketLayoutMismatch { .. })));
    }

    #[test]
    fn test_absorb_keeps_receiver_sizes() {
        let mut small = LatencyRecorder::new(config(2, 1)).unwrap();
        let mut large = LatencyRecorder::new(config(5, 4)).unwrap();
        for sample in 0..10 {
            small.record(sample * 10);
            large.record(sample * 10 + 5);
        }

        let mut into_large = large.clone();
        into_large.absorb(&small).unwrap();
        let summary = into_large.summary();
        // small only retained {0, 10} and {90}, so those are all it can contribute
        assert_eq!(summary.head, vec![0, 5, 10, 15, 25]);
        assert_eq!(summary.tail, vec![95, 90, 85, 75]);
        assert_eq!(summary.count, 20);
        assert_eq!(into_large.config().head_size, 5);
        assert_eq!(into_large.config().tail_size, 4);

        small.absorb(&large).unwrap();
        let summary = small.summary();
        assert_eq!(summary.head, vec![0, 5]);
        assert_eq!(summary.tail, vec![95]);
        assert_eq!(small.config().head_size, 2);
        assert_eq!(small.config().tail_size, 1);
    }

    #[test]
    fn test_absorb_matches_single_recorder() {
        let mut rng = StdRng::seed_from_u64(99);
        let samples: Vec<u64> = (0..4_000).map(|_| rng.random_range(0..150)).collect();

        let mut single = LatencyRecorder::new(config(10, 10)).unwrap();
        for &s in &samples {
            single.record(s);
        }

        let partials: Vec<LatencyRecorder> = std::thread::scope(|s| {
            let handles: Vec<_> = samples
                .chunks(1_000)
                .map(|chunk| {
                    s.spawn(move || {
                        let mut recorder = LatencyRecorder::new(config(10, 10)).unwrap();
                        for &sample in chunk {
                            recorder.record(sample);
                        }
                        recorder
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let mut merged = LatencyRecorder::new(config(10, 10)).unwrap();
        for partial in &partials {
            merged.absorb(partial).unwrap();
        }

        assert_eq!(merged.summary(), single.summary());
    }

    #[test]
    fn test_config_wire_names() {
        let config: LatencyConfig = serde_json::from_str(
            r#"{"latency_bucket_upper": 500, "latency_tail_size": 3}"#,
        )
        .unwrap();
        assert_eq!(config.bucket_upper, 500);
        assert_eq!(config.tail_size, 3);
        assert_eq!(config.bucket_lower, 0);
        assert_eq!(config.head_size, 10);
    }
}
