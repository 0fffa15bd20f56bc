pub mod config;
pub mod normalize;
pub mod taxonomy;
pub mod types;

pub use config::Config;
pub use taxonomy::{TaxonomyError, TaxonomyKind};
pub use types::*;
