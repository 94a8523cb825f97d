//! Inbound adapters (driving side): the operator CLI and webhook payload
//! decoding.

pub mod cli;
pub mod webhook;
