//! Utility modules

pub mod paths;
pub mod tools;

pub use paths::{
    archive_entry_name, data_root, default_extraction_dir, log_file_path, sentinel_path,
    LOG_FILE_NAME, SENTINEL_FILE_NAME,
};
pub use tools::{ensure_executable, is_valid_executable, resolve_program};
