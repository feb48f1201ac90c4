//! Linear encode queue: every job resolved against the whole batch up front.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::aggregate::{aggregate, AggregateSourceInfo};
use crate::core::command::ProcessStep;
use crate::core::error::{FfbError, ResolutionError};
use crate::core::job::{Job, JobStatus};
use crate::core::pipeline::{Step, StepOutput, StepPlan};
use crate::core::progress::media_time_axis;
use crate::core::resolver::{build_arguments, resolve_or_passthrough};

/// An ffmpeg step with a media-time progress axis.
pub fn transcode_step(ffmpeg: &str, arguments: Vec<String>, duration: Duration) -> ProcessStep {
    ProcessStep::new(ffmpeg, arguments).with_progress(media_time_axis(duration))
}

/// Resolves a probed job against `context` and builds its ffmpeg arguments.
/// `None` when the job has no probe result or output path yet.
pub(crate) fn transcode_arguments(
    job: &Job,
    context: &AggregateSourceInfo,
) -> Option<(Vec<String>, Option<ResolutionError>)> {
    let source = job.source.as_ref()?;
    let output = job.output.as_ref()?;
    let mut config = job.config.clone();
    config.bind_input_selection(source);
    let (resolved, err) = resolve_or_passthrough(&config, context, source);
    Some((build_arguments(&resolved, &job.input, output, source), err))
}

pub(crate) fn fallback_message(err: &ResolutionError) -> String {
    format!("{err}; copying streams instead")
}

/// Rejects destinations that exist or that several jobs share.
pub fn check_outputs<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Result<(), FfbError> {
    let mut seen: HashSet<&PathBuf> = HashSet::new();
    for output in jobs.into_iter().filter_map(|job| job.output.as_ref()) {
        if !seen.insert(output) {
            return Err(FfbError::DuplicateOutput {
                path: output.clone(),
            });
        }
        if output.exists() {
            return Err(FfbError::OutputExists {
                path: output.clone(),
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Transcode {
    pub job: usize,
    pub arguments: Vec<String>,
    pub duration: Duration,
}

#[derive(Debug)]
pub struct EncodePlan {
    ffmpeg: String,
    jobs: Vec<Job>,
    context: AggregateSourceInfo,
    queue: Vec<Transcode>,
}

impl EncodePlan {
    /// Aggregates the encodable jobs, checks every destination and builds
    /// all argument vectors before anything runs.
    pub fn prepare(mut jobs: Vec<Job>, ffmpeg: impl Into<String>) -> Result<Self, FfbError> {
        let sources: Vec<_> = jobs
            .iter()
            .filter(|job| job.is_encodable())
            .filter_map(|job| job.source.clone())
            .collect();
        if sources.is_empty() {
            return Err(FfbError::NoInputs);
        }
        let context = aggregate(&sources);

        check_outputs(jobs.iter().filter(|job| job.is_encodable()))?;

        let mut queue = Vec::with_capacity(sources.len());
        for (index, job) in jobs.iter_mut().enumerate() {
            if !job.is_encodable() {
                continue;
            }
            let Some((arguments, err)) = transcode_arguments(job, &context) else {
                continue;
            };
            if let Some(err) = err {
                let message = fallback_message(&err);
                tracing::warn!(input = %job.input.display(), "{message}");
                job.message = Some(message);
            }
            let duration = job.source.as_ref().map(|s| s.duration).unwrap_or_default();
            queue.push(Transcode {
                job: index,
                arguments,
                duration,
            });
        }

        tracing::info!(items = queue.len(), "encode queue prepared");
        Ok(Self {
            ffmpeg: ffmpeg.into(),
            jobs,
            context,
            queue,
        })
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn context(&self) -> &AggregateSourceInfo {
        &self.context
    }

    pub fn transcodes(&self) -> &[Transcode] {
        &self.queue
    }

    /// The job a pipeline step index belongs to.
    pub fn job_for_step(&self, index: usize) -> Option<&Job> {
        self.queue.get(index).map(|t| &self.jobs[t.job])
    }

    /// Marks the job of a failed or killed step.
    pub fn mark_failed(&mut self, index: usize, message: impl Into<String>) {
        if let Some(t) = self.queue.get(index) {
            let job = &mut self.jobs[t.job];
            job.status = JobStatus::Failed;
            job.message = Some(message.into());
        }
    }

    pub fn finished_count(&self) -> usize {
        self.jobs
            .iter()
            .filter(|job| job.status == JobStatus::Finished)
            .count()
    }
}

impl StepPlan for EncodePlan {
    fn next_step(&mut self, index: usize) -> Result<Option<Step<Self>>, FfbError> {
        let Some(transcode) = self.queue.get(index) else {
            return Ok(None);
        };
        let job = transcode.job;
        let process = transcode_step(&self.ffmpeg, transcode.arguments.clone(), transcode.duration)
            .final_step(index + 1 == self.queue.len());
        self.jobs[job].start();

        Ok(Some(Step::new(process, move |plan: &mut EncodePlan, _: &StepOutput| {
            plan.jobs[job].finish();
            Ok(())
        })))
    }

    fn step_count_hint(&self) -> Option<usize> {
        Some(self.queue.len())
    }
}
