//! Application use cases. Orchestrate domain logic via ports.

pub mod anchor_service;
pub mod archive_service;
pub mod border_validator;
pub mod boundary_service;
pub mod cache_service;
pub mod content_verifier;
pub mod fetch_service;
pub mod filter_service;
pub mod gap_validator;
pub mod media;
pub mod verification;

pub use anchor_service::AnchorService;
pub use archive_service::ArchiveService;
pub use border_validator::BorderValidator;
pub use boundary_service::BoundaryService;
pub use cache_service::CacheService;
pub use content_verifier::ContentVerifier;
pub use fetch_service::FetchService;
pub use filter_service::FilterService;
pub use gap_validator::{GapPolicy, GapValidator};
