pub(crate) mod client;
mod monitor;
mod process;
mod remote;
pub(crate) mod server;

pub use server::ServerConnection;
