pub mod config;
pub mod error;
pub mod knowledge;

pub use config::Config;
pub use error::*;
pub use knowledge::KnowledgeBase;
