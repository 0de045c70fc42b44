//! imgload CLI - pull registry images into a local container daemon.

pub mod commands;
pub mod output;
