// ABOUTME: Content-addressed artifact storage with alias indirection.
// ABOUTME: Exports the ArtifactStore trait, key layout, and memory/disk backends.

mod keys;
mod local;
mod memory;
mod presign;
mod traits;

pub use keys::{
    AliasSlot, MANIFEST_FILE, RELEASES_SEGMENT, ReleaseLayout, is_release_scoped, validate_key,
};
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use presign::{Presigner, object_url};
pub use traits::{
    ArtifactStore, ObjectHead, ObjectSummary, PresignMethod, PresignedUrl, PutOptions, PutResult,
    StoreError,
};
