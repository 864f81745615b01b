//! Shellcord Channels - Chat Adapters
//!
//! Connects the session engine to a chat platform:
//! - Discord (via serenity): live status embeds with controls, terminal
//!   output as code blocks, transcripts as attachments, slash commands

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod discord;
pub mod error;
pub mod util;

pub use error::{Error, Result};

pub use discord::{DiscordAdapter, DiscordConfig};
