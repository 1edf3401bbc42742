// ABOUTME: Command module aggregator for the sitepub CLI.
// ABOUTME: Re-exports publish, rollback, status, presign, and prune command handlers.

mod app;
mod presign;
mod prune;
mod publish;
mod rollback;
mod status;

pub use app::App;
pub use presign::presign;
pub use prune::prune;
pub use publish::{PublishArgs, publish};
pub use rollback::rollback;
pub use status::status;
