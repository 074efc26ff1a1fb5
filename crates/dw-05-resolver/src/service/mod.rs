mod publisher;
mod resolver;


pub use publisher::{DomainBinding, PublishOptions, PublishReport, Publisher};
pub use resolver::{DomainResolution, DomainSource, ResolvedFile, Resolver};
