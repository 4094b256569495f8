pub mod registry;
pub mod server;
pub mod stdio;
pub mod tools;
pub mod transport;
pub mod types;

pub use registry::{ToolDescriptor, ToolHandler, ToolRegistry};
pub use server::SkyServer;
pub use tools::SkyTools;
pub use transport::{bind, default_backends, TransportBackend, TransportError, TransportKind};
