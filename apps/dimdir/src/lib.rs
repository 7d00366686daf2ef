//! # dimdir
//!
//! Server and CLI for the Dimensional Directory. The engine lives in
//! `dimdir-core`; this crate adds configuration, the HTTP API and the
//! command line.

pub mod api;
pub mod cli;
pub mod config;
