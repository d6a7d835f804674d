//! Guild platform abstraction: what the gate needs from the chat service.

use async_trait::async_trait;

use crate::error::ChannelError;

/// An inbound message as delivered by the platform.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub author_id: u64,
    pub author_is_bot: bool,
    /// Channel to reply in.
    pub channel_id: u64,
    /// True for a one-to-one direct message channel.
    pub is_direct: bool,
    pub content: String,
}

/// A guild member as seen by the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub user_id: u64,
    pub display_name: String,
    pub avatar_url: Option<String>,
    /// Voice channel the member currently occupies, if any.
    pub voice_channel_id: Option<u64>,
}

/// Guild-scoped platform operations.
#[async_trait]
pub trait GuildPlatform: Send + Sync {
    /// Whether the controlling guild is reachable at all.
    async fn guild_available(&self) -> bool;

    /// Look up a member of the controlling guild. `None` if not a member.
    async fn member(&self, user_id: u64) -> Result<Option<MemberInfo>, ChannelError>;

    /// Name of a voice channel in the guild. `None` if missing or not voice.
    async fn voice_channel_name(&self, channel_id: u64) -> Option<String>;

    /// Move a member into a voice channel.
    async fn move_member(&self, user_id: u64, channel_id: u64) -> Result<(), ChannelError>;

    /// Send text to a channel.
    async fn send_text(&self, channel_id: u64, text: &str) -> Result<(), ChannelError>;
}
