//! Process-as-you-go intake: per item an optional filename-plugin step, a
//! probe step and, in immediate mode, a transcode step resolved against
//! that item alone.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::core::aggregate::aggregate;
use crate::core::config::EncodeConfig;
use crate::core::encode::{check_outputs, fallback_message, transcode_arguments, transcode_step};
use crate::core::error::FfbError;
use crate::core::job::{file_name, Job, JobStatus};
use crate::core::pipeline::{Step, StepOutput, StepPlan};
use crate::core::plugin::{output_name, FilenamePlugin};
use crate::core::preset::PresetStore;
use crate::core::probe::{parse_probe_output, probe_step};

#[derive(Debug, Clone)]
pub struct IntakeOptions {
    pub ffprobe: String,
    pub ffmpeg: String,
    /// Defaults to each input's own directory.
    pub output_dir: Option<PathBuf>,
    pub plugin: FilenamePlugin,
    pub immediate: bool,
    /// Preset every job starts with.
    pub preset: String,
    /// Settings used by the `custom` preset.
    pub custom: EncodeConfig,
    pub presets: PresetStore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Name,
    Probe,
    Transcode,
}

#[derive(Debug)]
pub struct IntakePlan {
    options: IntakeOptions,
    jobs: Vec<Job>,
    item: usize,
    phase: Phase,
    claimed: HashSet<PathBuf>,
}

fn output_path(output_dir: Option<&Path>, input: &Path, name: &str) -> PathBuf {
    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(name)
}

impl IntakePlan {
    pub fn new(inputs: Vec<PathBuf>, options: IntakeOptions) -> Result<Self, FfbError> {
        if inputs.is_empty() {
            return Err(FfbError::NoInputs);
        }

        let mut jobs: Vec<Job> = inputs
            .into_iter()
            .enumerate()
            .map(|(i, input)| Job::new(i as u64 + 1, input, options.preset.clone()))
            .collect();

        if !options.plugin.is_enabled() {
            for job in &mut jobs {
                let name = job.file_name();
                job.output = Some(output_path(options.output_dir.as_deref(), &job.input, &name));
            }
            if options.immediate {
                check_outputs(jobs.iter())?;
            }
        }

        Ok(Self {
            options,
            jobs,
            item: 0,
            phase: Phase::Name,
            claimed: HashSet::new(),
        })
    }

    pub fn into_jobs(self) -> Vec<Job> {
        self.jobs
    }

    fn name_step(&self, item: usize) -> Option<Step<Self>> {
        let source_name = self.jobs[item].file_name();
        let process = self.options.plugin.step(&source_name)?;
        Some(Step::new(process, move |plan: &mut IntakePlan, output: &StepOutput| {
            let name = output_name(&output.stdout)
                .ok_or_else(|| format!("filename plugin printed no name for '{source_name}'"))?;
            let job = &mut plan.jobs[item];
            job.output = Some(output_path(plan.options.output_dir.as_deref(), &job.input, &name));
            tracing::debug!(input = %job.input.display(), output = %name, "output name chosen");
            Ok(())
        }))
    }

    fn probe_step(&self, item: usize) -> Step<Self> {
        let process = probe_step(&self.options.ffprobe, &self.jobs[item].input);
        Step::new(process, move |plan: &mut IntakePlan, output: &StepOutput| {
            plan.register_probe(item, &output.stdout);
            Ok(())
        })
    }

    /// Probe failures reject the item only; the batch carries on.
    fn register_probe(&mut self, item: usize, stdout: &str) {
        let job = &mut self.jobs[item];
        let source = match parse_probe_output(stdout) {
            Ok(source) => source,
            Err(err) => {
                tracing::warn!(input = %job.input.display(), "rejected: {err}");
                job.reject(err.to_string());
                return;
            }
        };

        let mut config = match self.options.presets.config_for(&job.preset, &self.options.custom) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(input = %job.input.display(), "{err}; keeping source settings");
                job.message = Some(format!("{err}; keeping source settings"));
                EncodeConfig::matching(&source)
            }
        };
        config.bind_input_selection(&source);

        tracing::info!(input = %job.input.display(), duration = ?source.duration, "probed");
        job.config = config;
        job.source = Some(source);
        job.status = JobStatus::Probed;
    }

    fn transcode_step(&mut self, item: usize) -> Result<Option<Step<Self>>, FfbError> {
        let job = &self.jobs[item];
        if !job.is_encodable() {
            return Ok(None);
        }
        let (Some(source), Some(output)) = (job.source.as_ref(), job.output.clone()) else {
            return Ok(None);
        };

        if self.options.plugin.is_enabled() {
            if output.exists() {
                return Err(FfbError::OutputExists { path: output });
            }
            if !self.claimed.insert(output.clone()) {
                return Err(FfbError::DuplicateOutput { path: output });
            }
        }

        let context = aggregate(std::slice::from_ref(source));
        let duration = source.duration;
        let Some((arguments, err)) = transcode_arguments(job, &context) else {
            return Ok(None);
        };

        let job = &mut self.jobs[item];
        if let Some(err) = err {
            let message = fallback_message(&err);
            tracing::warn!(input = %job.input.display(), "{message}");
            job.message = Some(message);
        }
        job.start();

        let process = transcode_step(&self.options.ffmpeg, arguments, duration);
        Ok(Some(Step::new(process, move |plan: &mut IntakePlan, _: &StepOutput| {
            plan.jobs[item].finish();
            Ok(())
        })))
    }
}

impl StepPlan for IntakePlan {
    /// Walks items and phases; the pipeline index is not needed because
    /// the plan keeps its own cursor.
    fn next_step(&mut self, _index: usize) -> Result<Option<Step<Self>>, FfbError> {
        while self.item < self.jobs.len() {
            let item = self.item;
            match self.phase {
                Phase::Name => {
                    self.phase = Phase::Probe;
                    if let Some(step) = self.name_step(item) {
                        return Ok(Some(step));
                    }
                }
                Phase::Probe => {
                    self.phase = Phase::Transcode;
                    return Ok(Some(self.probe_step(item)));
                }
                Phase::Transcode => {
                    self.phase = Phase::Name;
                    self.item += 1;
                    if self.options.immediate {
                        if let Some(step) = self.transcode_step(item)? {
                            return Ok(Some(step));
                        }
                    }
                }
            }
        }
        Ok(None)
    }

    fn step_count_hint(&self) -> Option<usize> {
        let per_item = 1
            + usize::from(self.options.plugin.is_enabled())
            + usize::from(self.options.immediate);
        Some(self.jobs.len() * per_item)
    }
}

/// Short form of a job's state for listings.
pub fn describe(job: &Job) -> String {
    let output = job
        .output
        .as_deref()
        .map(file_name)
        .unwrap_or_else(|| "?".to_string());
    match job.status {
        JobStatus::Rejected => format!(
            "{} rejected: {}",
            job.file_name(),
            job.message.as_deref().unwrap_or("probe failed")
        ),
        _ => format!("{} -> {output} [{}]", job.file_name(), job.preset),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::{PipelineUpdate, ProcessEvent, Termination};
    use crate::core::pipeline::testing::FakeLauncher;
    use crate::core::pipeline::{Pipeline, PipelineState};
    use crate::core::preset::CUSTOM_PRESET;
    use crate::core::value::SelectableValue;

    const PROBE: &str = r#"{"streams": [
        {"codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720,
         "r_frame_rate": "30/1", "avg_frame_rate": "30/1"},
        {"codec_type": "audio", "codec_name": "aac"}],
        "format": {"duration": "12.5"}}"#;

    fn options(dir: &Path) -> IntakeOptions {
        IntakeOptions {
            ffprobe: "ffprobe".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            output_dir: Some(dir.to_path_buf()),
            plugin: FilenamePlugin::Disabled,
            immediate: false,
            preset: CUSTOM_PRESET.to_string(),
            custom: EncodeConfig::default(),
            presets: PresetStore::default(),
        }
    }

    fn inputs() -> Vec<PathBuf> {
        vec![PathBuf::from("/media/a.mp4"), PathBuf::from("/media/b.mp4")]
    }

    fn finish_step(
        pipeline: &mut Pipeline<IntakePlan, FakeLauncher>,
        launcher: &FakeLauncher,
        stdout: &str,
    ) {
        let index = launcher.count() - 1;
        if !stdout.is_empty() {
            launcher.stdout(index, stdout);
        }
        launcher.send(index, ProcessEvent::Finished(Termination::Exited(0)));
        pipeline.poll();
        pipeline.advance_requested();
    }

    #[test]
    fn probes_each_item_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let plan = IntakePlan::new(inputs(), options(dir.path())).unwrap();
        assert_eq!(plan.step_count_hint(), Some(2));
        let launcher = FakeLauncher::default();
        let mut pipeline = Pipeline::new(plan, launcher.clone());

        pipeline.start();
        assert_eq!(launcher.step(0).program, "ffprobe");
        assert_eq!(launcher.step(0).arguments.last().unwrap(), "/media/a.mp4");
        finish_step(&mut pipeline, &launcher, PROBE);
        assert_eq!(launcher.step(1).arguments.last().unwrap(), "/media/b.mp4");
        finish_step(&mut pipeline, &launcher, "{}");

        assert_eq!(pipeline.state(), PipelineState::Completed);
        let jobs = pipeline.into_plan().into_jobs();
        assert_eq!(jobs[0].status, JobStatus::Probed);
        assert_eq!(jobs[0].output, Some(dir.path().join("a.mp4")));
        assert_eq!(jobs[0].config.audio_codec, SelectableValue::SameAsInput("aac".to_string()));
        assert_eq!(jobs[1].status, JobStatus::Rejected);
        assert!(describe(&jobs[1]).contains("rejected"));
    }

    #[test]
    fn plugin_names_the_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path());
        opts.plugin = FilenamePlugin::parse(Some("namer --suffix x")).unwrap();
        let plan = IntakePlan::new(vec![PathBuf::from("/media/a.mp4")], opts).unwrap();
        let launcher = FakeLauncher::default();
        let mut pipeline = Pipeline::new(plan, launcher.clone());

        pipeline.start();
        assert_eq!(launcher.step(0).program, "namer");
        assert_eq!(launcher.step(0).arguments, vec!["--suffix", "x", "a.mp4"]);
        finish_step(&mut pipeline, &launcher, "renamed.mkv\n");
        assert_eq!(launcher.step(1).program, "ffprobe");
        finish_step(&mut pipeline, &launcher, PROBE);

        let jobs = pipeline.into_plan().into_jobs();
        assert_eq!(jobs[0].output, Some(dir.path().join("renamed.mkv")));
    }

    #[test]
    fn empty_plugin_output_fails_the_step() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path());
        opts.plugin = FilenamePlugin::parse(Some("namer")).unwrap();
        let plan = IntakePlan::new(vec![PathBuf::from("/media/a.mp4")], opts).unwrap();
        let launcher = FakeLauncher::default();
        let mut pipeline = Pipeline::new(plan, launcher.clone());

        pipeline.start();
        launcher.send(0, ProcessEvent::Finished(Termination::Exited(0)));
        let updates = pipeline.poll();
        assert!(matches!(updates.last(), Some(PipelineUpdate::Failed { index: 0, .. })));
        assert_eq!(launcher.count(), 1);
    }

    #[test]
    fn immediate_mode_transcodes_after_each_probe() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path());
        opts.immediate = true;
        opts.custom.video_codec = SelectableValue::Literal("hevc".to_string());
        let plan = IntakePlan::new(inputs(), opts).unwrap();
        let launcher = FakeLauncher::default();
        let mut pipeline = Pipeline::new(plan, launcher.clone());

        pipeline.start();
        finish_step(&mut pipeline, &launcher, PROBE);
        let transcode = launcher.step(1);
        assert_eq!(transcode.program, "ffmpeg");
        assert!(transcode.progress_axis.is_some());
        assert!(transcode.arguments.windows(2).any(|w| w[0] == "-c:v" && w[1] == "hevc"));
        assert!(!transcode.arguments.iter().any(|a| a == "-s"));
        finish_step(&mut pipeline, &launcher, "");

        assert_eq!(launcher.step(2).program, "ffprobe");
        finish_step(&mut pipeline, &launcher, "garbage");
        assert_eq!(pipeline.state(), PipelineState::Completed);
        assert_eq!(launcher.count(), 3);

        let jobs = pipeline.into_plan().into_jobs();
        assert_eq!(jobs[0].status, JobStatus::Finished);
        assert_eq!(jobs[1].status, JobStatus::Rejected);
    }

    #[test]
    fn immediate_mode_checks_outputs_up_front() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.mp4"), b"").unwrap();
        let mut opts = options(dir.path());
        opts.immediate = true;
        assert!(matches!(
            IntakePlan::new(inputs(), opts),
            Err(FfbError::OutputExists { .. })
        ));
    }

    #[test]
    fn broken_preset_falls_back_to_source_settings() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path());
        opts.preset = "missing".to_string();
        let plan = IntakePlan::new(vec![PathBuf::from("/media/a.mp4")], opts).unwrap();
        let launcher = FakeLauncher::default();
        let mut pipeline = Pipeline::new(plan, launcher.clone());

        pipeline.start();
        finish_step(&mut pipeline, &launcher, PROBE);
        let jobs = pipeline.into_plan().into_jobs();
        assert_eq!(jobs[0].config, EncodeConfig::matching(jobs[0].source.as_ref().unwrap()));
        assert!(jobs[0].message.as_deref().unwrap().contains("missing"));
    }

    #[test]
    fn no_inputs() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            IntakePlan::new(Vec::new(), options(dir.path())),
            Err(FfbError::NoInputs)
        ));
    }
}
