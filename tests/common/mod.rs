//! Shared test utilities for satchel
//!
//! This module provides common helpers for integration tests:
//! - Packager input trees (runner, cache, project)
//! - Launcher stand-ins and artifact builders

pub mod fixtures;
