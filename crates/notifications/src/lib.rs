//! Telegram notifications and the interactive approval dialogue
//!
//! One chat, one bot. Outbound messages share a one-per-second rate limit;
//! inbound button presses arrive through long-polled updates and are routed
//! to the download coordinator. The message-to-request mapping always lives
//! in the store (the pending row carries the message id), so a restart
//! loses nothing.

pub mod approval;
pub mod poller;
pub mod telegram;

pub use approval::TelegramNotifier;
pub use poller::CallbackPoller;
pub use telegram::{TelegramClient, TelegramConfig};
