pub mod aggregate;
pub mod command;
pub mod config;
pub mod encode;
pub mod error;
pub mod event;
pub mod formatter;
pub mod intake;
pub mod job;
pub mod pipeline;
pub mod plugin;
pub mod preset;
pub mod probe;
pub mod progress;
pub mod resolver;
pub mod runner;
pub mod settings;
pub mod value;
pub mod worklist;
