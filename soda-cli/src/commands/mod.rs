//! Command implementations for the soda CLI

pub mod annotate;
pub mod bbox;
pub mod config;
pub mod gallery;
