use std::fmt;
use std::sync::Arc;

pub type PositionParser = Arc<dyn Fn(&str, &str) -> i64 + Send + Sync>;
/// Called as `(min, position, max)`.
pub type PositionFormatter = Arc<dyn Fn(i64, i64, i64) -> String + Send + Sync>;

/// The range a step's completion is measured on, with the functions that
/// read a position out of output text and render it.
#[derive(Clone)]
pub struct ProgressAxis {
    pub min: i64,
    pub max: i64,
    parser: PositionParser,
    formatter: PositionFormatter,
}

impl ProgressAxis {
    /// `parser` gets a stdout and a stderr chunk and returns a negative
    /// value when neither holds a marker.
    pub fn new(
        min: i64,
        max: i64,
        parser: impl Fn(&str, &str) -> i64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            min,
            max,
            parser: Arc::new(parser),
            formatter: Arc::new(|min, position, max| format!("{}/{}", position - min, max - min)),
        }
    }

    pub fn with_formatter(
        mut self,
        formatter: impl Fn(i64, i64, i64) -> String + Send + Sync + 'static,
    ) -> Self {
        self.formatter = Arc::new(formatter);
        self
    }

    pub fn parse(&self, stdout: &str, stderr: &str) -> i64 {
        (self.parser)(stdout, stderr)
    }

    pub fn format(&self, position: i64) -> String {
        (self.formatter)(self.min, position, self.max)
    }

    pub fn contains(&self, position: i64) -> bool {
        (self.min..=self.max).contains(&position)
    }

    pub fn fraction(&self, position: i64) -> f64 {
        let span = self.max - self.min;
        if span <= 0 {
            return 1.0;
        }
        ((position - self.min) as f64 / span as f64).clamp(0.0, 1.0)
    }
}

impl fmt::Debug for ProgressAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressAxis")
            .field("min", &self.min)
            .field("max", &self.max)
            .finish_non_exhaustive()
    }
}

/// One external-process invocation within a pipeline.
#[derive(Debug, Clone)]
pub struct ProcessStep {
    pub program: String,
    pub arguments: Vec<String>,
    pub is_pipeline_final: bool,
    pub progress_axis: Option<ProgressAxis>,
}

impl ProcessStep {
    pub fn new(program: impl Into<String>, arguments: Vec<String>) -> Self {
        Self {
            program: program.into(),
            arguments,
            is_pipeline_final: false,
            progress_axis: None,
        }
    }

    pub fn final_step(mut self, is_final: bool) -> Self {
        self.is_pipeline_final = is_final;
        self
    }

    pub fn with_progress(mut self, axis: ProgressAxis) -> Self {
        self.progress_axis = Some(axis);
        self
    }

    /// Shell-quoted rendering for logs and the session history.
    pub fn command_line(&self) -> String {
        let mut words = Vec::with_capacity(self.arguments.len() + 1);
        words.push(self.program.as_str());
        words.extend(self.arguments.iter().map(String::as_str));
        shell_words::join(words)
    }
}
