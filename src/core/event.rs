use crate::core::progress::ProgressReading;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(i32),
    /// Terminated by a signal; no exit code.
    Crashed,
}

/// What a running process reports. Exactly one of `Finished` or `Errored`
/// ends the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Started { pid: u32 },
    Output(StreamKind, String),
    Finished(Termination),
    Errored(String),
}

/// What the pipeline reports to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineUpdate {
    StepStarted {
        index: usize,
        program: String,
        command_line: String,
    },
    StepRunning {
        index: usize,
        pid: u32,
    },
    Output {
        index: usize,
        stream: StreamKind,
        text: String,
    },
    Progress {
        index: usize,
        reading: ProgressReading,
    },
    StepCompleted {
        index: usize,
        is_final: bool,
    },
    Completed,
    Failed {
        index: usize,
        program: String,
        reason: String,
    },
    Killed {
        index: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Progress,
    Warning,
    Error,
    Prompt,
    Noise,
}

pub fn classify_log_line(line: &str) -> LogLevel {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LogLevel::Noise;
    }

    if trimmed.contains("time=") && (trimmed.contains("frame=") || trimmed.contains("size=")) {
        return LogLevel::Progress;
    }

    if trimmed.contains("Overwrite?") && trimmed.contains("[y/N]") {
        return LogLevel::Prompt;
    }

    let lower = trimmed.to_ascii_lowercase();
    let noise_prefixes = [
        "ffmpeg version",
        "ffprobe version",
        "built with",
        "configuration:",
        "libavutil",
        "libavcodec",
        "libavformat",
        "libavdevice",
        "libavfilter",
        "libswscale",
        "libswresample",
        "libpostproc",
    ];

    if noise_prefixes.iter().any(|prefix| lower.starts_with(prefix)) {
        return LogLevel::Noise;
    }

    if lower.contains("error")
        || lower.contains("invalid")
        || lower.contains("no such file")
        || lower.contains("not found")
        || lower.contains("already exists")
    {
        return LogLevel::Error;
    }

    if lower.contains("warning") || lower.contains("deprecated") {
        return LogLevel::Warning;
    }

    LogLevel::Noise
}

const EXCERPT_LINES: usize = 5;

/// The lines of a failed step's stderr worth showing: error lines if there
/// are any, otherwise the tail.
pub fn diagnostic_excerpt(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .split(|c: char| c == '\r' || c == '\n')
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect();

    let errors: Vec<&str> = lines
        .iter()
        .copied()
        .filter(|line| matches!(classify_log_line(line), LogLevel::Error | LogLevel::Prompt))
        .collect();

    let chosen = if errors.is_empty() { lines } else { errors };
    let start = chosen.len().saturating_sub(EXCERPT_LINES);
    chosen[start..].join("\n")
}

/// Reassembles lines that arrive split across output chunks. ffmpeg ends
/// its status line with `\r`, so that counts as a line end too.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.pending.push_str(text);
        let mut lines = Vec::new();
        while let Some(end) = self.pending.find(|c: char| c == '\r' || c == '\n') {
            let line: String = self.pending.drain(..=end).collect();
            let line = line.trim_end();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// Whatever is left once the stream has ended.
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let rest = rest.trim_end();
        (!rest.is_empty()).then(|| rest.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_progress_and_errors() {
        assert_eq!(
            classify_log_line(
                "frame=  120 fps= 30 q=28.0 size=512kB time=00:00:04.00 bitrate=1048kbits/s"
            ),
            LogLevel::Progress
        );
        assert_eq!(classify_log_line("in.mp4: No such file or directory"), LogLevel::Error);
        assert_eq!(
            classify_log_line("File 'out.mp4' already exists. Overwrite? [y/N]"),
            LogLevel::Prompt
        );
        assert_eq!(classify_log_line("ffmpeg version 6.1"), LogLevel::Noise);
    }

    #[test]
    fn excerpt_prefers_error_lines() {
        let stderr = "ffmpeg version 6.1\nInput #0\nEncoder 'foo' not found\n\
                      Error initializing output stream\n";
        assert_eq!(
            diagnostic_excerpt(stderr),
            "Encoder 'foo' not found\nError initializing output stream"
        );
    }

    #[test]
    fn excerpt_falls_back_to_tail() {
        let stderr = (1..=8).map(|i| format!("line {i}\n")).collect::<String>();
        assert_eq!(diagnostic_excerpt(&stderr), "line 4\nline 5\nline 6\nline 7\nline 8");
        assert_eq!(diagnostic_excerpt(""), "");
    }

    #[test]
    fn line_buffer_joins_split_chunks() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push("Input #0, mov").is_empty());
        assert_eq!(
            buffer.push(", mp4\nframe= 1 time=00:00:01.00\r"),
            vec![
                "Input #0, mov, mp4".to_string(),
                "frame= 1 time=00:00:01.00".to_string(),
            ]
        );
        assert_eq!(buffer.push("\r\nlast"), Vec::<String>::new());
        assert_eq!(buffer.flush().as_deref(), Some("last"));
        assert_eq!(buffer.flush(), None);
    }
}
