use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("latency bucket range is empty: lower bound {lower} must be below upper bound {upper}")]
    InvalidBucketRange { lower: u64, upper: u64 },

    #[error("latency bucket granularity must be greater than zero")]
    ZeroGranularity,

    #[error("latency bucket layout needs {count} buckets, at most {max} are allowed")]
    TooManyBuckets { count: u64, max: usize },

    #[error("cannot absorb a recorder with a different bucket layout ({theirs} vs {ours})")]
    BucketLayoutMismatch { ours: String, theirs: String },

    #[error("invalid latency sample {value:?} on line {line}")]
    ParseSample { line: usize, value: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
