//! vidutils - batch media utilities on top of ffmpeg
//!
//! Every operation is a [`job::MediaJob`] turned into an ffmpeg invocation by
//! [`media::CommandBuilder`], run by a [`media::JobRunner`] and aggregated by a
//! [`batch::BatchCoordinator`].

pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod job;
pub mod media;
pub mod progress;
pub mod subtitle;
pub mod workflow;
