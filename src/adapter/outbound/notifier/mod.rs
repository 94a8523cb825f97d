//! Notification adapters.
//!
//! Implements the `port::Notifier` trait for various notification backends.

pub mod format;
pub mod webhook;

#[cfg(feature = "telegram")]
pub mod telegram;

pub use webhook::WebhookNotifier;

#[cfg(test)]
mod tests;
