/// Content-addressed media engine
///
/// Uploads are canonicalized by the transcoder, identified by the hash
/// of their canonical bytes, persisted through a storage backend and
/// tracked in the catalog. The store ties the pipelines together.
pub mod catalog;
pub mod hash;
pub mod models;
pub mod path;
pub mod store;
pub mod transcode;

pub use catalog::Catalog;
pub use models::{MediaFolder, MediaObject, MediaPage};
pub use store::{FetchedMedia, MediaBody, MediaKey, MediaStore};
