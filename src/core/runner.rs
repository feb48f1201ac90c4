use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::core::command::ProcessStep;
use crate::core::event::{ProcessEvent, StreamKind, Termination};

const POLL_INTERVAL: Duration = Duration::from_millis(25);
const READ_BUFFER: usize = 4096;
/// How long the readers get to drain the pipes once the process is gone. A
/// grandchild holding a pipe open keeps its reader running past this.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Control surface of one launched process.
pub trait ProcessControl {
    /// Requests forced termination. Safe to call more than once.
    fn kill(&self);
    fn program(&self) -> &str;
    fn arguments(&self) -> &[String];
}

/// Starts processes and reports their events over `events`.
pub trait Launcher {
    type Handle: ProcessControl;

    fn launch(&self, step: &ProcessStep, events: Sender<ProcessEvent>) -> Self::Handle;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    type Handle = ProcessHandle;

    fn launch(&self, step: &ProcessStep, events: Sender<ProcessEvent>) -> ProcessHandle {
        ProcessHandle::spawn(step.program.clone(), step.arguments.clone(), events)
    }
}

#[derive(Debug, Default)]
struct Lifecycle {
    started: bool,
    finished: bool,
}

type SharedLifecycle = Arc<(Mutex<Lifecycle>, Condvar)>;

/// A process running on a background supervisor thread.
#[derive(Debug)]
pub struct ProcessHandle {
    program: String,
    arguments: Vec<String>,
    kill_tx: Sender<()>,
    lifecycle: SharedLifecycle,
}

impl ProcessHandle {
    pub fn spawn(program: String, arguments: Vec<String>, events: Sender<ProcessEvent>) -> Self {
        let (kill_tx, kill_rx) = mpsc::channel::<()>();
        let lifecycle: SharedLifecycle = Arc::default();

        let supervisor = Supervisor {
            program: program.clone(),
            arguments: arguments.clone(),
            events,
            kill_rx,
            lifecycle: Arc::clone(&lifecycle),
        };
        thread::spawn(move || supervisor.run());

        Self {
            program,
            arguments,
            kill_tx,
            lifecycle,
        }
    }

    /// Blocks until the process started or failed to start; `true` if it
    /// started within `timeout`.
    pub fn wait_for_started(&self, timeout: Duration) -> bool {
        self.wait_until(timeout, |state| state.started || state.finished)
            .map(|state| state.started)
            .unwrap_or(false)
    }

    /// Blocks until the terminal event was sent; `true` if that happened
    /// within `timeout`.
    pub fn wait_for_finished(&self, timeout: Duration) -> bool {
        self.wait_until(timeout, |state| state.finished)
            .map(|state| state.finished)
            .unwrap_or(false)
    }

    fn wait_until(
        &self,
        timeout: Duration,
        done: impl Fn(&Lifecycle) -> bool,
    ) -> Option<Lifecycle> {
        let (lock, condvar) = &*self.lifecycle;
        let guard = lock.lock().ok()?;
        let (guard, _) = condvar
            .wait_timeout_while(guard, timeout, |state| !done(state))
            .ok()?;
        Some(Lifecycle {
            started: guard.started,
            finished: guard.finished,
        })
    }
}

impl ProcessControl for ProcessHandle {
    fn kill(&self) {
        let _ = self.kill_tx.send(());
    }

    fn program(&self) -> &str {
        &self.program
    }

    fn arguments(&self) -> &[String] {
        &self.arguments
    }
}

struct Supervisor {
    program: String,
    arguments: Vec<String>,
    events: Sender<ProcessEvent>,
    kill_rx: Receiver<()>,
    lifecycle: SharedLifecycle,
}

impl Supervisor {
    fn run(self) {
        let mut command = Command::new(&self.program);
        command
            .args(&self.arguments)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                let reason = if err.kind() == io::ErrorKind::NotFound {
                    format!("{} not found", self.program)
                } else {
                    format!("failed to start {}: {err}", self.program)
                };
                tracing::debug!(program = %self.program, "launch failed: {reason}");
                self.finish(ProcessEvent::Errored(reason));
                return;
            }
        };

        let pid = child.id();
        self.update(|state| state.started = true);
        let _ = self.events.send(ProcessEvent::Started { pid });
        tracing::debug!(program = %self.program, pid, "process started");

        let (drained_tx, drained_rx) = mpsc::channel::<()>();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_chunk_reader(
                StreamKind::Stdout,
                stdout,
                self.events.clone(),
                drained_tx.clone(),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_chunk_reader(
                StreamKind::Stderr,
                stderr,
                self.events.clone(),
                drained_tx.clone(),
            ));
        }
        drop(drained_tx);

        let status = wait_or_kill(&mut child, &self.kill_rx);
        self.join_readers(readers, &drained_rx);

        let event = match status {
            Ok(status) => ProcessEvent::Finished(termination(status)),
            Err(err) => {
                ProcessEvent::Errored(format!("failed to wait for {}: {err}", self.program))
            }
        };
        tracing::debug!(program = %self.program, pid, ?event, "process ended");
        self.finish(event);
    }

    /// Joins the readers that finish within [`DRAIN_GRACE`] and detaches the
    /// rest.
    fn join_readers(&self, readers: Vec<thread::JoinHandle<()>>, drained: &Receiver<()>) {
        let deadline = Instant::now() + DRAIN_GRACE;
        for _ in 0..readers.len() {
            let left = deadline.saturating_duration_since(Instant::now());
            if drained.recv_timeout(left).is_err() {
                tracing::warn!(
                    program = %self.program,
                    "output still open after exit, not waiting for it"
                );
                return;
            }
        }
        for reader in readers {
            let _ = reader.join();
        }
    }

    fn finish(&self, event: ProcessEvent) {
        let _ = self.events.send(event);
        self.update(|state| state.finished = true);
    }

    fn update(&self, change: impl FnOnce(&mut Lifecycle)) {
        let (lock, condvar) = &*self.lifecycle;
        if let Ok(mut state) = lock.lock() {
            change(&mut state);
            condvar.notify_all();
        }
    }
}

fn termination(status: ExitStatus) -> Termination {
    match status.code() {
        Some(code) => Termination::Exited(code),
        None => Termination::Crashed,
    }
}

/// Waits for the child, killing it on request or when the handle is gone.
fn wait_or_kill(child: &mut Child, kill_rx: &Receiver<()>) -> io::Result<ExitStatus> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        match kill_rx.recv_timeout(POLL_INTERVAL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = child.kill();
                return child.wait();
            }
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
}

fn spawn_chunk_reader<R: Read + Send + 'static>(
    stream: StreamKind,
    mut reader: R,
    events: Sender<ProcessEvent>,
    drained: Sender<()>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut decoder = Utf8Chunker::default();
        let mut buf = [0u8; READ_BUFFER];

        loop {
            let read = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            };
            let text = decoder.push(&buf[..read]);
            if !text.is_empty() {
                let _ = events.send(ProcessEvent::Output(stream, text));
            }
        }

        let rest = decoder.finish();
        if !rest.is_empty() {
            let _ = events.send(ProcessEvent::Output(stream, rest));
        }
        let _ = drained.send(());
    })
}

/// Decodes UTF-8 across read boundaries. An incomplete trailing sequence is
/// held until the next chunk; invalid bytes become U+FFFD.
#[derive(Debug, Default)]
struct Utf8Chunker {
    pending: Vec<u8>,
}

impl Utf8Chunker {
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        let consumed = self.pending.len() - rest.len();
        self.pending.drain(..consumed);
        out
    }

    fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}
