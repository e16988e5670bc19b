pub mod cli;
pub mod config;
pub mod controller;
pub mod datasources;
pub mod error;
pub mod models;
pub mod pricing;
pub mod reader;
pub mod remote;
pub mod summary;
pub mod watcher;

pub use config::{Config, EngineSettings};
pub use controller::{Controller, ControllerHandle, RefreshState};
pub use error::{Error, Result};
