pub mod approval;
pub mod compat;
pub mod error;
pub mod registry;

pub use approval::SchemaApprovalService;
pub use compat::{check_compatibility, definition_fingerprint, CompatibilityCheckResult};
pub use error::SchemaError;
pub use registry::SchemaRegistry;
