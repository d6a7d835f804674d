//! Chat platform I/O.

pub mod discord;
pub mod platform;

pub use discord::{DiscordHandler, DiscordPlatform};
pub use platform::{GuildPlatform, InboundMessage, MemberInfo};
