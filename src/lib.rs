pub mod artifact;
pub mod assets;
pub mod chem;
pub mod cli;
pub mod collaborators;
pub mod config;
pub mod envelope;
pub mod error;
pub mod init;
pub mod mcp;
pub mod sandbox;
pub mod utils;

pub use envelope::{Envelope, ErrorType};
pub use error::ToolFailure;
