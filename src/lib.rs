//! Batch transcoding with settings relative to the inputs.
//!
//! [`core::pipeline::Pipeline`] runs external processes one step at a time,
//! [`core::resolver`] turns input-relative settings into ffmpeg arguments
//! and [`core::runner::ProcessHandle`] wraps a single child process.

pub mod core;
