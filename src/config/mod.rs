mod settings;

pub use settings::{
    BuildInfo, Layout, LayoutError, Manifest, Settings, DEFAULT_APP_NAME, EXAMPLE_LAYOUT,
    MANIFEST_FILE_NAME, PAYLOAD_MARKER,
};
