//! CLI module graph.

pub mod check;
pub mod command;
pub mod dispatch;
pub mod jobs;
pub mod markets;
pub mod output;
pub mod paths;
pub mod run;
