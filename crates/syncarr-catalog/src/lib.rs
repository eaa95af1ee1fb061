pub mod error;
pub mod plex;
pub mod traits;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::CatalogError;
pub use plex::PlexCatalogClient;
pub use traits::{CatalogClient, ServerIdentity, TagField, TextField};
