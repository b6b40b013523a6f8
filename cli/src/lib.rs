//! docker-spk CLI - Pack Docker images as Sandstorm packages.

pub mod commands;
pub mod output;
