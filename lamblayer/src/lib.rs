//! lamblayer library.
//!
//! This crate publishes AWS Lambda layer versions, either by zipping a local
//! directory or by asking a remote packaging service to build a dependency
//! bundle. It is used by the `lamblayer` CLI binary and can be driven
//! programmatically with custom collaborators for testing.
//!
//! # Modules
//!
//! - [`archive`] - Zip archives of local source directories
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - Layer config and package spec files
//! - [`create`] - The create-layer workflow
//! - [`error`] - Error types surfaced to the user
//! - [`fetch`] - Remote package builds
//! - [`logging`] - Logger initialisation
//! - [`output`] - Dry-run and summary formatting
//! - [`poll`] - Poll scheduling with exponential backoff
//! - [`publish`] - Layer version publishing
//! - [`region`] - Region name validation
//! - [`session`] - Cloud provider session setup

pub mod archive;
pub mod cli;
pub mod config;
pub mod create;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod output;
pub mod poll;
pub mod publish;
pub mod region;
pub mod session;
