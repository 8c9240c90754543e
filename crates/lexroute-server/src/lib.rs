//! Process wiring for the lexroute server: configuration and the concrete
//! backend bundle.

pub mod backends;
pub mod config;

pub use backends::{EmbedderChoice, LiveBackends, Services};
pub use config::ServerConfig;
