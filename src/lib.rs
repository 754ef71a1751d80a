pub mod config;
pub mod error;
pub mod hunt;
#[cfg(feature = "cli")]
pub mod logger;
pub mod oracle;
pub mod position;
pub mod protocol;

pub use error::HuntError;
