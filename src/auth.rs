//! Credential identifiers, application credentials, and access token models.

pub mod credentials;
pub mod id;
pub mod token;

pub use credentials::*;
pub use id::*;
pub use token::{access::*, secret::*};
