pub mod chunk;
pub mod config;
pub mod embed;
pub mod errors;
pub mod extract;
pub mod llm;
pub mod logging;
pub mod rag;
pub mod server;
pub mod session;
pub mod state;
pub mod store;
