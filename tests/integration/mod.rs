//! Integration tests for satchel
//!
//! These tests build real artifacts with the packager and run them back
//! through the launcher.

#[path = "../common/mod.rs"]
pub mod common;

pub mod launch_flow;
