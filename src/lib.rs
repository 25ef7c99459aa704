pub mod broadcast;
pub mod config;
pub mod error;
pub mod protocol;
pub mod reconciler;
pub mod state;
pub mod types;
pub mod ws;
