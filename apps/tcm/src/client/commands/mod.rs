pub mod admin;
pub mod backup;
pub mod build;
pub mod core;
pub mod player;
pub mod server;
