pub mod attempts;
pub mod errors;
pub mod publish;

pub use attempts::*;
pub use errors::{ClientError, PointerError, ResolveError};
pub use publish::{split_chunks, ChunkedFile, ManifestUpload};
