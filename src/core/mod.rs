//! Core chat components
//!
//! Request composition and the streamed reply relay.

mod chat;
pub mod relay;

pub use chat::{compose, ChatEngine, ChatError};
pub use relay::{relay, RelayError};
