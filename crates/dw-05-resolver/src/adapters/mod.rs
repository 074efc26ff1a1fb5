pub mod cache;
pub mod observer;
pub mod peer_bridge;
pub mod pointer;
pub mod registry_client;
pub mod storage_client;

pub use cache::{cache_key, MemoryChunkCache};
pub use observer::{MemoryObserver, TracingObserver};
pub use peer_bridge::PeerBridge;
pub use pointer::HttpPointerFetcher;
pub use registry_client::HttpRegistryClient;
pub use storage_client::StorageClient;
