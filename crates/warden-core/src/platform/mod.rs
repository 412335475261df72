//! Platform client abstraction (the chat service the bot is connected to).

pub mod port;
pub mod throttled;
