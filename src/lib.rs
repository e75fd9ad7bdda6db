pub mod app;
pub mod cli;
pub mod config;
pub mod gallery;
pub mod session;
pub mod source;
pub mod ui;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
