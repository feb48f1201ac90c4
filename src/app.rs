//! Wires the command line to the plans and hands each pipeline to a front end.

use std::io;
use std::path::{Path, PathBuf};

use ffbatch::core::aggregate::aggregate;
use ffbatch::core::config::EncodeConfig;
use ffbatch::core::encode::EncodePlan;
use ffbatch::core::error::FfbError;
use ffbatch::core::formatter::{
    format_aggregate_line, format_config_line, format_duration, format_source_line,
};
use ffbatch::core::intake::{describe, IntakeOptions, IntakePlan};
use ffbatch::core::job::{Job, JobStatus};
use ffbatch::core::pipeline::{Pipeline, PipelineState, StepPlan};
use ffbatch::core::plugin::FilenamePlugin;
use ffbatch::core::preset::PresetStore;
use ffbatch::core::runner::ProcessLauncher;
use ffbatch::core::settings::{settings_dir, Settings, PRESETS_FILE, SETTINGS_FILE};
use ffbatch::core::worklist::{parse_work_list, sort_by_duration, total_duration};

use crate::cli::{Cli, Commands, EncodeArgs, InputArgs, ProbeArgs};
use crate::console::Console;
use crate::tui::Tui;

/// Something that can show a running pipeline and plain notices.
pub trait Frontend {
    /// Runs the pipeline to its end, advancing after every successful step.
    fn drive<P: StepPlan>(
        &mut self,
        title: &str,
        pipeline: &mut Pipeline<P>,
    ) -> Result<(), FfbError>;

    fn notice(&mut self, line: &str);

    /// Called once everything is done, also after a failure.
    fn finish(&mut self) -> Result<(), FfbError> {
        Ok(())
    }
}

/// Turns a finished pipeline state into the run's result. `None` while the
/// pipeline is still going. `last_step` is the index of the step started last.
pub(crate) fn pipeline_result(
    state: PipelineState,
    last_step: usize,
    failure: Option<&str>,
) -> Option<Result<(), FfbError>> {
    match state {
        PipelineState::Completed => Some(Ok(())),
        PipelineState::Failed(step) => Some(Err(FfbError::ProcessFailed {
            step,
            message: failure.unwrap_or("unknown failure").to_string(),
        })),
        PipelineState::Killed => Some(Err(FfbError::Killed { step: last_step })),
        PipelineState::Idle | PipelineState::Running(_) => None,
    }
}

pub fn init_tracing(verbose: bool, to_sink: bool) {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if verbose {
            "ffbatch=debug".to_string()
        } else {
            "ffbatch=info".to_string()
        }
    });

    let builder = tracing_subscriber::fmt().with_env_filter(env_filter.as_str());
    // The terminal view owns the screen.
    if to_sink {
        builder.with_writer(io::sink).init();
    } else {
        builder.with_writer(io::stderr).init();
    }
}

/// True when the command takes over the terminal.
pub fn uses_terminal_view(cli: &Cli) -> bool {
    match &cli.command {
        Commands::Encode(args) => !args.input.plain,
        Commands::Probe(args) => !args.input.plain,
        Commands::Presets => false,
    }
}

pub fn execute(cli: Cli) -> Result<(), FfbError> {
    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(|| settings_dir().join(SETTINGS_FILE));
    let presets_path = cli
        .presets
        .clone()
        .unwrap_or_else(|| settings_dir().join(PRESETS_FILE));
    let settings = Settings::load_or_default(&settings_path)?;

    match cli.command {
        Commands::Encode(args) => {
            let presets = PresetStore::load_or_empty(&presets_path);
            if args.input.plain {
                encode(&mut Console::standard(), &settings, presets, &args)
            } else {
                with_terminal(|tui| encode(tui, &settings, presets, &args))
            }
        }
        Commands::Probe(args) => {
            if args.input.plain {
                probe(&mut Console::standard(), &settings, &args)
            } else {
                with_terminal(|tui| probe(tui, &settings, &args))
            }
        }
        Commands::Presets => list_presets(&presets_path),
    }
}

/// Keeps the terminal view open until the user dismisses it, failure or not.
fn with_terminal(run: impl FnOnce(&mut Tui) -> Result<(), FfbError>) -> Result<(), FfbError> {
    let mut tui = Tui::enter()?;
    let result = run(&mut tui);
    if let Err(err) = &result {
        tui.notice(&format!("error: {err}"));
    }
    tui.finish()?;
    result
}

fn collect_inputs(args: &InputArgs) -> Result<Vec<PathBuf>, FfbError> {
    let mut inputs = args.inputs.clone();
    if let Some(list) = &args.list {
        let listed = parse_work_list(list).map_err(|source| FfbError::Io {
            path: list.clone(),
            source,
        })?;
        inputs.extend(listed);
    }
    if inputs.is_empty() {
        return Err(FfbError::NoInputs);
    }
    Ok(inputs)
}

fn report_probe_results<F: Frontend>(frontend: &mut F, jobs: &[Job]) {
    for job in jobs {
        match (&job.status, &job.source) {
            (JobStatus::Rejected, _) | (_, None) => frontend.notice(&describe(job)),
            (_, Some(source)) => {
                frontend.notice(&format!("{}: {}", job.file_name(), format_source_line(source)))
            }
        }
    }
    let probed = jobs.iter().filter(|job| job.source.is_some()).count();
    frontend.notice(&format!(
        "{probed} of {} inputs probed, total length {}",
        jobs.len(),
        format_duration(total_duration(jobs))
    ));
}

fn intake<F: Frontend>(
    frontend: &mut F,
    title: &str,
    inputs: Vec<PathBuf>,
    options: IntakeOptions,
) -> Result<Vec<Job>, FfbError> {
    let plan = IntakePlan::new(inputs, options)?;
    let mut pipeline = Pipeline::new(plan, ProcessLauncher);
    let result = frontend.drive(title, &mut pipeline);
    let jobs = pipeline.into_plan().into_jobs();
    if result.is_err() {
        for job in &jobs {
            frontend.notice(&describe(job));
        }
    }
    result.map(|()| jobs)
}

fn encode<F: Frontend>(
    frontend: &mut F,
    settings: &Settings,
    presets: PresetStore,
    args: &EncodeArgs,
) -> Result<(), FfbError> {
    let inputs = collect_inputs(&args.input)?;
    let preset = args
        .preset
        .clone()
        .unwrap_or_else(|| settings.default_preset.clone());
    let custom = args.custom_config()?;
    frontend.notice(&format!("preset {preset}: {}", describe_preset(&presets, &preset, &custom)));

    let options = IntakeOptions {
        ffprobe: settings.ffprobe.clone(),
        ffmpeg: settings.ffmpeg.clone(),
        output_dir: args.output_dir.clone(),
        plugin: settings.filename_plugin()?,
        immediate: args.immediate,
        preset,
        custom,
        presets,
    };
    let title = if args.immediate { "encoding" } else { "probing" };
    let mut jobs = intake(frontend, title, inputs, options)?;

    if args.input.sort {
        sort_by_duration(&mut jobs);
    }
    report_probe_results(frontend, &jobs);

    if args.immediate {
        for job in &jobs {
            frontend.notice(&describe(job));
        }
        return Ok(());
    }

    let plan = EncodePlan::prepare(jobs, settings.ffmpeg.clone())?;
    frontend.notice(&format!("inputs: {}", format_aggregate_line(plan.context())));
    for transcode in plan.transcodes() {
        let job = &plan.jobs()[transcode.job];
        frontend.notice(&format!("{}: {}", job.file_name(), format_config_line(&job.config)));
        if let Some(message) = &job.message {
            frontend.notice(&format!("{}: {message}", job.file_name()));
        }
    }

    let mut pipeline = Pipeline::new(plan, ProcessLauncher);
    let result = frontend.drive("encoding", &mut pipeline);
    let mut plan = pipeline.into_plan();
    if let Err(err) = &result {
        if let Some(step) = failed_step(err) {
            if let Some(job) = plan.job_for_step(step) {
                frontend.notice(&format!("stopped while encoding {}", job.file_name()));
            }
            plan.mark_failed(step, err.to_string());
        }
    }

    for job in plan.jobs() {
        frontend.notice(&describe(job));
    }
    frontend.notice(&format!(
        "{} of {} items encoded",
        plan.finished_count(),
        plan.transcodes().len()
    ));
    result
}

fn failed_step(err: &FfbError) -> Option<usize> {
    match err {
        FfbError::ProcessFailed { step, .. } | FfbError::Killed { step } => Some(*step),
        _ => None,
    }
}

fn describe_preset(presets: &PresetStore, name: &str, custom: &EncodeConfig) -> String {
    match presets.config_for(name, custom) {
        Ok(config) => format_config_line(&config),
        Err(err) => format!("{err}; items will keep their source settings"),
    }
}

fn probe<F: Frontend>(
    frontend: &mut F,
    settings: &Settings,
    args: &ProbeArgs,
) -> Result<(), FfbError> {
    let inputs = collect_inputs(&args.input)?;
    let options = IntakeOptions {
        ffprobe: settings.ffprobe.clone(),
        ffmpeg: settings.ffmpeg.clone(),
        output_dir: None,
        plugin: FilenamePlugin::Disabled,
        immediate: false,
        preset: settings.default_preset.clone(),
        custom: EncodeConfig::default(),
        presets: PresetStore::default(),
    };
    let mut jobs = intake(frontend, "probing", inputs, options)?;
    if args.input.sort {
        sort_by_duration(&mut jobs);
    }
    report_probe_results(frontend, &jobs);

    let sources: Vec<_> = jobs.iter().filter_map(|job| job.source.clone()).collect();
    frontend.notice(&format!("aggregate: {}", format_aggregate_line(&aggregate(&sources))));
    Ok(())
}

fn list_presets(path: &Path) -> Result<(), FfbError> {
    let presets = PresetStore::load(path)?;
    if presets.is_empty() {
        println!("no presets in '{}'", path.display());
        return Ok(());
    }
    println!("'{}' (version {})", path.display(), presets.version());
    for name in presets.names() {
        match presets.get(name) {
            Ok(config) => println!("  {name}: {}", format_config_line(&config)),
            Err(err) => println!("  {name}: {err}"),
        }
    }
    Ok(())
}
