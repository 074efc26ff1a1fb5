pub mod identity;

pub use identity::load_or_generate;
