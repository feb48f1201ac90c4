use std::io::{self, Stderr, Stdout, Write};
use std::time::Duration;

use ffbatch::core::error::FfbError;
use ffbatch::core::event::{classify_log_line, LineBuffer, LogLevel, PipelineUpdate, StreamKind};
use ffbatch::core::formatter::{format_progress_reading, format_step_counter};
use ffbatch::core::pipeline::{Pipeline, StepPlan};

use crate::app::{pipeline_result, Frontend};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Plain line-oriented driver: notices go to `out`, process chatter and the
/// progress line to `log`.
pub struct Console<O: Write, E: Write> {
    out: O,
    log: E,
    stderr_lines: LineBuffer,
    progress_shown: bool,
}

impl Console<Stdout, Stderr> {
    pub fn standard() -> Self {
        Self::new(io::stdout(), io::stderr())
    }
}

impl<O: Write, E: Write> Console<O, E> {
    pub fn new(out: O, log: E) -> Self {
        Self {
            out,
            log,
            stderr_lines: LineBuffer::default(),
            progress_shown: false,
        }
    }

    /// Ends an open `\r` progress line before anything else is printed.
    fn end_progress_line(&mut self) {
        if self.progress_shown {
            let _ = writeln!(self.log);
            self.progress_shown = false;
        }
    }

    fn report(&mut self, title: &str, total: Option<usize>, update: &PipelineUpdate) {
        match update {
            PipelineUpdate::StepStarted {
                index,
                command_line,
                ..
            } => {
                self.end_progress_line();
                self.stderr_lines = LineBuffer::default();
                let counter = format_step_counter(*index, total);
                let _ = writeln!(self.log, "[{title} {counter}] {command_line}");
            }
            PipelineUpdate::StepRunning { .. } => {}
            PipelineUpdate::Output {
                stream: StreamKind::Stderr,
                text,
                ..
            } => {
                for line in self.stderr_lines.push(text) {
                    if matches!(
                        classify_log_line(&line),
                        LogLevel::Warning | LogLevel::Error | LogLevel::Prompt
                    ) {
                        self.end_progress_line();
                        let _ = writeln!(self.log, "  {line}");
                    }
                }
            }
            PipelineUpdate::Output { .. } => {}
            PipelineUpdate::Progress { reading, .. } => {
                let _ = write!(self.log, "\r  {}", format_progress_reading(reading));
                let _ = self.log.flush();
                self.progress_shown = true;
            }
            PipelineUpdate::StepCompleted { .. } => self.end_progress_line(),
            PipelineUpdate::Completed => {
                self.end_progress_line();
                let _ = writeln!(self.log, "[{title}] done");
            }
            PipelineUpdate::Failed { index, reason, .. } => {
                self.end_progress_line();
                let _ = writeln!(self.log, "[{title}] step {} failed: {reason}", index + 1);
            }
            PipelineUpdate::Killed { index } => {
                self.end_progress_line();
                let _ = writeln!(self.log, "[{title}] killed at step {}", index + 1);
            }
        }
    }
}

impl<O: Write, E: Write> Frontend for Console<O, E> {
    fn drive<P: StepPlan>(
        &mut self,
        title: &str,
        pipeline: &mut Pipeline<P>,
    ) -> Result<(), FfbError> {
        let total = pipeline.plan().step_count_hint();
        let mut last_step = 0;
        let mut failure: Option<String> = None;
        let mut updates = pipeline.start();

        loop {
            for update in updates.drain(..) {
                match &update {
                    PipelineUpdate::StepStarted { index, .. } => last_step = *index,
                    PipelineUpdate::Failed { reason, .. } => failure = Some(reason.clone()),
                    _ => {}
                }
                self.report(title, total, &update);
            }

            if let Some(result) = pipeline_result(pipeline.state(), last_step, failure.as_deref()) {
                return result;
            }

            updates = if pipeline.is_awaiting_advance() {
                pipeline.advance_requested()
            } else {
                pipeline.wait(POLL_INTERVAL)
            };
        }
    }

    fn notice(&mut self, line: &str) {
        self.end_progress_line();
        let _ = writeln!(self.out, "{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffbatch::core::command::ProcessStep;
    use ffbatch::core::pipeline::Step;
    use ffbatch::core::progress::media_time_axis;
    use ffbatch::core::runner::ProcessLauncher;

    #[test]
    fn only_problem_lines_reach_the_log() {
        let mut console = Console::new(Vec::new(), Vec::new());
        let output = |text: &str| PipelineUpdate::Output {
            index: 0,
            stream: StreamKind::Stderr,
            text: text.to_string(),
        };
        console.report(
            "encoding",
            Some(1),
            &output("ffmpeg version 6.1\nframe= 1 size=1kB time=00:00:01.00\r"),
        );
        console.report("encoding", Some(1), &output("[aac] Warning: too many"));
        console.report("encoding", Some(1), &output(" bits\n"));
        let log = String::from_utf8(console.log).unwrap();
        assert_eq!(log, "  [aac] Warning: too many bits\n");
    }

    #[cfg(unix)]
    mod process {
        use super::*;

        struct Script {
            commands: Vec<&'static str>,
            ran: usize,
        }

        impl StepPlan for Script {
            fn next_step(&mut self, index: usize) -> Result<Option<Step<Self>>, FfbError> {
                let Some(command) = self.commands.get(index) else {
                    return Ok(None);
                };
                let process = ProcessStep::new("sh", vec!["-c".to_string(), command.to_string()])
                    .with_progress(media_time_axis(Duration::from_secs(4)));
                Ok(Some(Step::new(process, |plan: &mut Script, _| {
                    plan.ran += 1;
                    Ok(())
                })))
            }

            fn step_count_hint(&self) -> Option<usize> {
                Some(self.commands.len())
            }
        }

        fn run(commands: Vec<&'static str>) -> (Result<(), FfbError>, usize, String) {
            let mut console = Console::new(Vec::new(), Vec::new());
            let mut pipeline = Pipeline::new(Script { commands, ran: 0 }, ProcessLauncher);
            let result = console.drive("test", &mut pipeline);
            let log = String::from_utf8(console.log).unwrap();
            (result, pipeline.into_plan().ran, log)
        }

        #[test]
        fn runs_every_step_in_order() {
            let (result, ran, log) = run(vec![
                "echo 'frame=1 size=1kB time=00:00:01.00' >&2",
                "echo 'frame=2 size=2kB time=00:00:02.00' >&2",
            ]);
            assert!(result.is_ok());
            assert_eq!(ran, 2);
            assert!(log.contains("[test 1/2]"));
            assert!(log.contains("[test 2/2]"));
            assert!(log.ends_with("[test] done\n"));
        }

        #[test]
        fn failure_stops_the_run() {
            let (result, ran, _) = run(vec![
                "true",
                "echo 'Error opening output' >&2; exit 1",
                "true",
            ]);
            match result {
                Err(FfbError::ProcessFailed { step, message }) => {
                    assert_eq!(step, 1);
                    assert!(message.contains("sh exited with code 1"));
                    assert!(message.contains("Error opening output"));
                }
                other => panic!("unexpected {other:?}"),
            }
            assert_eq!(ran, 1);
        }
    }
}
