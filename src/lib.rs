// Public API for integration tests and library usage

pub mod api;
pub mod auth;
pub mod broadcast;
pub mod clock;
pub mod config;
pub mod error;
pub mod handle;
pub mod producer;
pub mod state;
pub mod types;

pub use broadcast::{LongPollBroadcaster, ParkedClient, Subscription};
