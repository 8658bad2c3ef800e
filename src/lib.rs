// pressdeck: detect, install and activate WordPress plugins published in an
// organization's repositories

pub mod cache;
pub mod cli;
pub mod config;
pub mod detect;
pub mod error;
pub mod gateway;
pub mod host;
pub mod install;
pub mod repos;
pub mod resolver;
pub mod row;
pub mod service;
pub mod source;
pub mod update;

pub use config::Config;
pub use error::{ErrorKind, PressdeckError};
pub use service::AdminService;
