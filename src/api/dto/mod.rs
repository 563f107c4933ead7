//! Data Transfer Objects for REST request/response serialization.
//!
//! Every body is camelCase JSON.

pub mod common_dto;
pub mod module_dto;
pub mod optimizer_dto;
pub mod upload_dto;

pub use common_dto::*;
pub use module_dto::*;
pub use optimizer_dto::*;
pub use upload_dto::*;
