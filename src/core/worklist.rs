use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::job::Job;

/// Reads one input path per line; blank lines and `#` comments are skipped.
pub fn parse_work_list(path: &Path) -> Result<Vec<PathBuf>, io::Error> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut inputs = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        inputs.push(PathBuf::from(trimmed));
    }

    Ok(inputs)
}

/// Shortest source first; items without a probe result go last.
pub fn sort_by_duration(jobs: &mut [Job]) {
    jobs.sort_by_key(|job| match &job.source {
        Some(source) => (false, source.duration),
        None => (true, Duration::ZERO),
    });
}

pub fn total_duration(jobs: &[Job]) -> Duration {
    jobs.iter()
        .filter_map(|job| job.source.as_ref())
        .map(|source| source.duration)
        .sum()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::core::aggregate::source;

    #[test]
    fn skips_comments_and_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# batch").unwrap();
        writeln!(file, "/media/a.mp4").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  /media/b c.mp4  ").unwrap();
        let inputs = parse_work_list(file.path()).unwrap();
        assert_eq!(
            inputs,
            vec![PathBuf::from("/media/a.mp4"), PathBuf::from("/media/b c.mp4")]
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(parse_work_list(&dir.path().join("nope.txt")).is_err());
    }

    #[test]
    fn sorts_and_totals_by_duration() {
        let mut long = Job::new(1, PathBuf::from("long.mp4"), "custom");
        let mut info = source(1280, 720, 30.0, "aac", "h264");
        info.duration = Duration::from_secs(90);
        long.source = Some(info);

        let mut short = Job::new(2, PathBuf::from("short.mp4"), "custom");
        let mut info = source(1280, 720, 30.0, "aac", "h264");
        info.duration = Duration::from_secs(30);
        short.source = Some(info);

        let unprobed = Job::new(3, PathBuf::from("bad.mp4"), "custom");

        let mut jobs = vec![unprobed, long, short];
        sort_by_duration(&mut jobs);
        assert_eq!(jobs.iter().map(|j| j.id).collect::<Vec<_>>(), vec![2, 1, 3]);
        assert_eq!(total_duration(&jobs), Duration::from_secs(120));
    }
}
