pub mod config;
pub mod error;
pub mod fs;
pub mod handle;
pub mod logger;
pub mod remote;
pub mod utils;

pub use error::{Error, Result};
pub use handle::ReadFileHandle;
