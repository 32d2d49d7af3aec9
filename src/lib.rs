pub mod config;
pub mod launch;
pub mod pack;
pub mod util;

pub use config::{Layout, Manifest, Settings, PAYLOAD_MARKER};
pub use launch::{LaunchError, LaunchPlan, Launcher};
pub use pack::{ArtifactReport, BuildRequest, PackError, Packager};
