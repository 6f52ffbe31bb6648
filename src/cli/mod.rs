//! CLI command handlers

pub mod commands;

pub use commands::{assumptions, generate, preview};
