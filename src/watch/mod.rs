// src/watch/mod.rs

//! Hot reload of `script_file` sources.
//!
//! A `notify` watcher observes the directories holding entity script files.
//! When a file's content changes, every entity using it receives the new
//! source through [`Scheduler::update_configuration`](crate::scheduler::Scheduler::update_configuration),
//! which persists it and restarts the ticker like any other edit.

pub mod reload;
pub mod watcher;

pub use reload::{ScriptChange, ScriptIndex};
pub use watcher::{spawn_watcher, ScriptSource, WatcherHandle};
