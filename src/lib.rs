pub mod auth;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod filter;
pub mod format;
pub mod manifest;
pub mod registry;
pub mod service;
pub mod store;

#[cfg(test)]
mod test_support;

pub use anyhow::Result;
