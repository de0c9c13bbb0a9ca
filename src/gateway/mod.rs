pub mod context;
pub mod server;

pub use context::GatewayContext;
pub use server::GatewayServer;
