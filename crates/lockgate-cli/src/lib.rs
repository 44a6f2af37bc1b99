//! Lockgate CLI - Terminal front end for the login controller
//!
//! Drives a [`lockgate_core::LoginController`] backed by the on-disk
//! credential store, so failure counts and lockouts carry over between runs.

pub mod commands;

pub use commands::*;
