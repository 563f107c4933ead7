//! Service layer: business logic orchestration.
//!
//! [`UploadService`] runs the deduplication pipeline inside one storage
//! transaction per batch, [`ModuleService`] keeps module inventories, and
//! [`OptimizerService`] runs the loadout optimizer behind the result
//! cache. All three talk to storage through the traits in
//! [`crate::persistence`].

pub mod module_service;
pub mod optimizer_service;
pub mod upload_service;

pub use module_service::ModuleService;
pub use optimizer_service::{OptimizeMetadata, OptimizeOutcome, OptimizerService};
pub use upload_service::{CheckReport, IngestReport, UploadService};
