//! Client for the world service's remote-access (RA) console.

mod session;
mod settings;

pub use session::{RaCredentials, RaSession};
pub use settings::{RaSettings, load_ra_settings};
