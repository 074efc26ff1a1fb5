pub mod fifo;
pub mod store;

pub use fifo::FifoCache;
pub use store::LocalChunkStore;
