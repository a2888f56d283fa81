mod job;

pub use job::{CorrelationToken, JobError, JobMode, SynthesisJob};
