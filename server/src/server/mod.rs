mod coordinator;
mod server_config;

pub use coordinator::Coordinator;
pub use server_config::ServerConfig;
