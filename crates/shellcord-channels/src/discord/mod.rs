//! Discord - serenity adapter
//!
//! One-shot commands render as an embed that is edited in place, with
//! `Ctrl + C`, `Send Input` and `Finish` buttons. Terminal output is posted as
//! code blocks in the bound channel, and the controller's plain messages in
//! that channel are written to the shell.

pub mod adapter;
pub mod commands;
pub mod config;
pub mod handler;

pub use adapter::DiscordAdapter;
pub use config::DiscordConfig;
