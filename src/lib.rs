pub mod cli;
pub mod config;
pub mod dns;
pub mod endpoint;
pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod plan;
pub mod schedule;
pub mod site;
pub mod steps;

pub use error::{Error, Result};
