//! Access token records and the redacting secret wrapper.

pub mod access;
pub mod secret;
