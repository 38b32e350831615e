//! Command-line front end for `stackrun`.
//!
//! Argument parsing, env-file loading, logging setup, and the terminal
//! operator live here. The AWS control plane is behind the `aws` feature.

#![forbid(unsafe_code)]
#![warn(clippy::all, missing_docs, rust_2018_idioms)]

pub mod args;
#[cfg(feature = "aws")]
pub mod aws;
pub mod env;
pub mod logging;
pub mod terminal;
