// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Uses phantom types to prevent ID confusion at compile time.

mod id;
mod release_hash;

pub use id::{DeploymentId, Id, IdError, SiteId, TenantId};
pub use release_hash::{ReleaseHash, ReleaseHashError, sha256_hex};
