#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod provider;
pub mod render;
pub mod summarize;

pub use error::{Error, Result};
