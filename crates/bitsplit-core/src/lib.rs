pub mod config;
pub mod error;

pub use config::BitsplitConfig;
pub use error::{BitsplitError, BitsplitResult, ErrorKind};
