//! VRM exporter library
//!
//! Turns an avatar scene snapshot into a VRM 0.x or 1.x binary glTF file,
//! and reads such files back for inspection.

pub mod container;
pub mod error;
pub mod export;
pub mod inspect;
pub mod logging;
pub mod scene;

pub use error::{ContainerError, ExportError};
pub use export::{
    ExportOptions, ExportOutput, ExportReport, Severity, ValidationIssue, VrmVersion, export_vrm,
    normalize_weights, write_vrm,
};
pub use inspect::{InspectReport, inspect_vrm, rip_vrm};
pub use logging::{LogLevel, ResultExt, init_logging, send_log};
pub use scene::{SceneSnapshot, load_scene_snapshot};
