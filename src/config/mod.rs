pub mod schema;

pub use schema::{Config, DatabaseConfig, GatewayConfig, InviteConfig, PoolConfig};
