//! Sequential execution of external-process steps.
//!
//! A [`StepPlan`] hands out steps one index at a time. The pipeline runs at
//! most one of them, turns its [`ProcessEvent`]s into [`PipelineUpdate`]s and
//! moves on only after a clean exit, a successful continuation and an
//! explicit [`Pipeline::advance_requested`] from the consumer.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::time::{Duration, Instant};

use crate::core::command::ProcessStep;
use crate::core::error::FfbError;
use crate::core::event::{diagnostic_excerpt, PipelineUpdate, ProcessEvent, StreamKind, Termination};
use crate::core::progress::ProgressEstimator;
use crate::core::runner::{Launcher, ProcessControl, ProcessLauncher};

/// Everything a step printed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs once after the step's process exits with code 0. An error fails the
/// pipeline at that step.
pub type Continuation<P> = Box<dyn FnOnce(&mut P, &StepOutput) -> Result<(), String>>;

pub struct Step<P> {
    process: ProcessStep,
    continuation: Option<Continuation<P>>,
}

impl<P> Step<P> {
    pub fn new(
        process: ProcessStep,
        continuation: impl FnOnce(&mut P, &StepOutput) -> Result<(), String> + 'static,
    ) -> Self {
        Self {
            process,
            continuation: Some(Box::new(continuation)),
        }
    }

    /// A step nothing needs to react to.
    pub fn detached(process: ProcessStep) -> Self {
        Self {
            process,
            continuation: None,
        }
    }
}

pub trait StepPlan: Sized {
    /// The step at `index`, or `None` when the plan is exhausted.
    fn next_step(&mut self, index: usize) -> Result<Option<Step<Self>>, FfbError>;

    fn step_count_hint(&self) -> Option<usize> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running(usize),
    Completed,
    Failed(usize),
    Killed,
}

struct ActiveStep<P, H> {
    index: usize,
    handle: H,
    events: Receiver<ProcessEvent>,
    estimator: Option<ProgressEstimator>,
    output: StepOutput,
    continuation: Option<Continuation<P>>,
    is_final: bool,
}

pub struct Pipeline<P: StepPlan, L: Launcher = ProcessLauncher> {
    plan: P,
    launcher: L,
    state: PipelineState,
    active: Option<ActiveStep<P, L::Handle>>,
    awaiting_advance: bool,
}

impl<P: StepPlan, L: Launcher> Pipeline<P, L> {
    pub fn new(plan: P, launcher: L) -> Self {
        Self {
            plan,
            launcher,
            state: PipelineState::Idle,
            active: None,
            awaiting_advance: false,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn plan(&self) -> &P {
        &self.plan
    }

    pub fn into_plan(self) -> P {
        self.plan
    }

    /// True between a step's successful completion and the next
    /// [`advance_requested`](Self::advance_requested).
    pub fn is_awaiting_advance(&self) -> bool {
        self.awaiting_advance
    }

    pub fn active_program(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.handle.program())
    }

    pub fn active_arguments(&self) -> Option<&[String]> {
        self.active.as_ref().map(|active| active.handle.arguments())
    }

    pub fn start(&mut self) -> Vec<PipelineUpdate> {
        let mut updates = Vec::new();
        if self.state == PipelineState::Idle {
            self.launch(0, &mut updates);
        }
        updates
    }

    /// Moves to the next step. Does nothing unless the current step has
    /// completed successfully.
    pub fn advance_requested(&mut self) -> Vec<PipelineUpdate> {
        let mut updates = Vec::new();
        let PipelineState::Running(index) = self.state else {
            return updates;
        };
        if !self.awaiting_advance {
            return updates;
        }
        self.awaiting_advance = false;
        self.launch(index + 1, &mut updates);
        updates
    }

    /// Forced termination. Events the process sends afterwards are never
    /// observed.
    pub fn kill(&mut self) -> Vec<PipelineUpdate> {
        let PipelineState::Running(index) = self.state else {
            return Vec::new();
        };
        if let Some(active) = self.active.take() {
            active.handle.kill();
        }
        self.awaiting_advance = false;
        self.state = PipelineState::Killed;
        tracing::info!(step = index, "pipeline killed");
        vec![PipelineUpdate::Killed { index }]
    }

    /// Drains every event the active step has produced so far.
    pub fn poll(&mut self) -> Vec<PipelineUpdate> {
        let mut updates = Vec::new();
        while let Some(active) = self.active.as_ref() {
            match active.events.try_recv() {
                Ok(event) => self.handle_event(event, &mut updates),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.disconnected(&mut updates),
            }
        }
        updates
    }

    /// Blocks up to `timeout` for the next event, then drains the rest.
    pub fn wait(&mut self, timeout: Duration) -> Vec<PipelineUpdate> {
        let mut updates = Vec::new();
        let Some(active) = self.active.as_ref() else {
            return updates;
        };
        match active.events.recv_timeout(timeout) {
            Ok(event) => self.handle_event(event, &mut updates),
            Err(RecvTimeoutError::Timeout) => return updates,
            Err(RecvTimeoutError::Disconnected) => self.disconnected(&mut updates),
        }
        updates.extend(self.poll());
        updates
    }

    fn launch(&mut self, index: usize, updates: &mut Vec<PipelineUpdate>) {
        let step = match self.plan.next_step(index) {
            Ok(Some(step)) => step,
            Ok(None) => {
                self.state = PipelineState::Completed;
                tracing::info!(steps = index, "pipeline completed");
                updates.push(PipelineUpdate::Completed);
                return;
            }
            Err(err) => {
                self.fail(index, String::new(), err.to_string(), updates);
                return;
            }
        };

        let Step {
            process,
            continuation,
        } = step;
        let command_line = process.command_line();
        tracing::info!(step = index, "running {command_line}");
        updates.push(PipelineUpdate::StepStarted {
            index,
            program: process.program.clone(),
            command_line,
        });

        let (tx, rx) = mpsc::channel();
        let handle = self.launcher.launch(&process, tx);
        self.state = PipelineState::Running(index);
        self.active = Some(ActiveStep {
            index,
            handle,
            events: rx,
            estimator: process.progress_axis.clone().map(ProgressEstimator::new),
            output: StepOutput::default(),
            continuation,
            is_final: process.is_pipeline_final,
        });
    }

    fn handle_event(&mut self, event: ProcessEvent, updates: &mut Vec<PipelineUpdate>) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let index = active.index;

        match event {
            ProcessEvent::Started { pid } => {
                updates.push(PipelineUpdate::StepRunning { index, pid });
            }
            ProcessEvent::Output(stream, text) => {
                let (stdout, stderr) = match stream {
                    StreamKind::Stdout => (text.as_str(), ""),
                    StreamKind::Stderr => ("", text.as_str()),
                };
                let reading = active
                    .estimator
                    .as_mut()
                    .and_then(|estimator| estimator.update(stdout, stderr, Instant::now()));
                match stream {
                    StreamKind::Stdout => active.output.stdout.push_str(&text),
                    StreamKind::Stderr => active.output.stderr.push_str(&text),
                }
                updates.push(PipelineUpdate::Output {
                    index,
                    stream,
                    text,
                });
                if let Some(reading) = reading {
                    updates.push(PipelineUpdate::Progress { index, reading });
                }
            }
            ProcessEvent::Finished(Termination::Exited(0)) => self.complete_active(updates),
            ProcessEvent::Finished(Termination::Exited(code)) => {
                let reason = format!("{} exited with code {code}", active.handle.program());
                self.fail_active(reason, updates);
            }
            ProcessEvent::Finished(Termination::Crashed) => {
                let reason = format!("{} crashed", active.handle.program());
                self.fail_active(reason, updates);
            }
            ProcessEvent::Errored(reason) => self.fail_active(reason, updates),
        }
    }

    fn disconnected(&mut self, updates: &mut Vec<PipelineUpdate>) {
        self.fail_active("process ended without reporting a status".to_string(), updates);
    }

    fn complete_active(&mut self, updates: &mut Vec<PipelineUpdate>) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        let index = active.index;

        if let Some(continuation) = active.continuation.take() {
            if let Err(reason) = continuation(&mut self.plan, &active.output) {
                let program = active.handle.program().to_string();
                self.fail(index, program, reason, updates);
                return;
            }
        }

        tracing::debug!(step = index, "step completed");
        updates.push(PipelineUpdate::StepCompleted {
            index,
            is_final: active.is_final,
        });

        if active.is_final {
            self.state = PipelineState::Completed;
            tracing::info!(steps = index + 1, "pipeline completed");
            updates.push(PipelineUpdate::Completed);
        } else {
            self.awaiting_advance = true;
        }
    }

    fn fail_active(&mut self, reason: String, updates: &mut Vec<PipelineUpdate>) {
        let Some(active) = self.active.take() else {
            return;
        };
        let excerpt = diagnostic_excerpt(&active.output.stderr);
        let reason = if excerpt.is_empty() {
            reason
        } else {
            format!("{reason}\n{excerpt}")
        };
        let program = active.handle.program().to_string();
        self.fail(active.index, program, reason, updates);
    }

    fn fail(
        &mut self,
        index: usize,
        program: String,
        reason: String,
        updates: &mut Vec<PipelineUpdate>,
    ) {
        tracing::warn!(step = index, program = %program, "step failed: {reason}");
        self.awaiting_advance = false;
        self.state = PipelineState::Failed(index);
        updates.push(PipelineUpdate::Failed {
            index,
            program,
            reason,
        });
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::sync::mpsc::Sender;

    use super::*;

    pub struct FakeHandle {
        program: String,
        arguments: Vec<String>,
        killed: Rc<Cell<bool>>,
    }

    impl ProcessControl for FakeHandle {
        fn kill(&self) {
            self.killed.set(true);
        }

        fn program(&self) -> &str {
            &self.program
        }

        fn arguments(&self) -> &[String] {
            &self.arguments
        }
    }

    /// Records launches; tests play the process by sending events.
    #[derive(Clone, Default)]
    pub struct FakeLauncher {
        pub launches: Rc<RefCell<Vec<(ProcessStep, Sender<ProcessEvent>)>>>,
        pub killed: Rc<Cell<bool>>,
    }

    impl FakeLauncher {
        pub fn count(&self) -> usize {
            self.launches.borrow().len()
        }

        pub fn step(&self, index: usize) -> ProcessStep {
            self.launches.borrow()[index].0.clone()
        }

        pub fn send(&self, index: usize, event: ProcessEvent) {
            let _ = self.launches.borrow()[index].1.send(event);
        }

        pub fn exit(&self, index: usize, code: i32) {
            self.send(index, ProcessEvent::Finished(Termination::Exited(code)));
        }

        pub fn stdout(&self, index: usize, text: &str) {
            self.send(index, ProcessEvent::Output(StreamKind::Stdout, text.to_string()));
        }
    }

    impl Launcher for FakeLauncher {
        type Handle = FakeHandle;

        fn launch(&self, step: &ProcessStep, events: Sender<ProcessEvent>) -> FakeHandle {
            self.launches.borrow_mut().push((step.clone(), events));
            FakeHandle {
                program: step.program.clone(),
                arguments: step.arguments.clone(),
                killed: Rc::clone(&self.killed),
            }
        }
    }
}
