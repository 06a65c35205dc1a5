//! Repository traits for metadata operations.

pub mod announce;
pub mod blobs;
pub mod claims;
pub mod files;
pub mod streams;

pub use announce::AnnounceRepo;
pub use blobs::BlobRepo;
pub use claims::ClaimRepo;
pub use files::FileRepo;
pub use streams::StreamRepo;
