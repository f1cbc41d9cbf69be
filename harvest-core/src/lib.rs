pub mod collaborators;
pub mod config;
pub mod error;
pub mod error_utils;
pub mod hashtags;
pub mod types;

pub use collaborators::*;
pub use config::*;
pub use error::*;
pub use error_utils::*;
pub use hashtags::*;
pub use types::*;
