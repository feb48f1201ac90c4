use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::core::aggregate::SourceMediaInfo;
use crate::core::config::EncodeConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Probed,
    /// Probing failed; never transcoded.
    Rejected,
    Encoding,
    Finished,
    Failed,
}

/// One work item: a source file and how it will be encoded.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: u64,
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub source: Option<SourceMediaInfo>,
    pub config: EncodeConfig,
    pub preset: String,
    pub status: JobStatus,
    pub message: Option<String>,
    pub started_at: Option<Instant>,
    pub ended_at: Option<Instant>,
}

impl Job {
    pub fn new(id: u64, input: PathBuf, preset: impl Into<String>) -> Self {
        Self {
            id,
            input,
            output: None,
            source: None,
            config: EncodeConfig::default(),
            preset: preset.into(),
            status: JobStatus::Pending,
            message: None,
            started_at: None,
            ended_at: None,
        }
    }

    /// Probed and not rejected.
    pub fn is_encodable(&self) -> bool {
        self.source.is_some()
            && self.output.is_some()
            && !matches!(self.status, JobStatus::Rejected | JobStatus::Pending)
    }

    pub fn file_name(&self) -> String {
        file_name(&self.input)
    }

    pub fn reject(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Rejected;
        self.message = Some(message.into());
    }

    pub fn start(&mut self) {
        self.status = JobStatus::Encoding;
        self.started_at = Some(Instant::now());
    }

    pub fn finish(&mut self) {
        self.status = JobStatus::Finished;
        self.ended_at = Some(Instant::now());
    }
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::aggregate::source;

    #[test]
    fn lifecycle() {
        let mut job = Job::new(1, PathBuf::from("/media/clip.mp4"), "custom");
        assert_eq!(job.file_name(), "clip.mp4");
        assert!(!job.is_encodable());

        job.source = Some(source(1280, 720, 30.0, "aac", "h264"));
        job.output = Some(PathBuf::from("/out/clip.mp4"));
        job.status = JobStatus::Probed;
        assert!(job.is_encodable());

        job.start();
        assert!(job.started_at.is_some());
        job.finish();
        assert_eq!(job.status, JobStatus::Finished);
    }

    #[test]
    fn rejected_jobs_are_not_encodable() {
        let mut job = Job::new(2, PathBuf::from("bad.mp4"), "custom");
        job.source = Some(source(1280, 720, 30.0, "aac", "h264"));
        job.output = Some(PathBuf::from("out.mp4"));
        job.reject("video stream was not found");
        assert!(!job.is_encodable());
        assert_eq!(job.message.as_deref(), Some("video stream was not found"));
    }
}
