//! Discord channel: serenity event handler plus the `GuildPlatform`
//! implementation the gate talks to.

use std::sync::Arc;

use async_trait::async_trait;
use serenity::all::{
    Cache, ChannelId, ChannelType, Context, EditMember, EventHandler, GatewayIntents, GuildId,
    Http, Message, Ready, UserId,
};
use tracing::{debug, info, warn};

use crate::channels::{GuildPlatform, InboundMessage, MemberInfo};
use crate::config::{GuildConfig, OPENING_ANNOUNCEMENT};
use crate::error::ChannelError;
use crate::gate::MessageGate;

/// Discord's maximum message content length in characters.
const MAX_DISCORD_LEN: usize = 2000;

/// Split text into chunks that fit in one Discord message.
fn split_message(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars
        .chunks(MAX_DISCORD_LEN)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// `GuildPlatform` over serenity's cache and HTTP client.
///
/// Voice states only arrive through the gateway, so "where is this member"
/// is answered from the cache; members and channels fall back to HTTP.
pub struct DiscordPlatform {
    http: Arc<Http>,
    cache: Arc<Cache>,
    guild_id: GuildId,
}

impl DiscordPlatform {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>, guild_id: u64) -> Self {
        Self {
            http,
            cache,
            guild_id: GuildId::new(guild_id),
        }
    }

    pub fn from_context(ctx: &Context, guild_id: u64) -> Self {
        Self::new(Arc::clone(&ctx.http), Arc::clone(&ctx.cache), guild_id)
    }

    fn cached_voice_channel(&self, user_id: UserId) -> Option<u64> {
        self.cache
            .guild(self.guild_id)
            .and_then(|guild| guild.voice_states.get(&user_id).and_then(|vs| vs.channel_id))
            .map(|id| id.get())
    }
}

#[async_trait]
impl GuildPlatform for DiscordPlatform {
    async fn guild_available(&self) -> bool {
        if self.cache.guild(self.guild_id).is_some() {
            return true;
        }
        self.guild_id.to_partial_guild(self.http.as_ref()).await.is_ok()
    }

    async fn member(&self, user_id: u64) -> Result<Option<MemberInfo>, ChannelError> {
        let uid = UserId::new(user_id);

        let cached = self.cache.guild(self.guild_id).and_then(|guild| {
            guild.members.get(&uid).map(|m| MemberInfo {
                user_id,
                display_name: m.display_name().to_string(),
                avatar_url: Some(m.face()),
                voice_channel_id: guild
                    .voice_states
                    .get(&uid)
                    .and_then(|vs| vs.channel_id)
                    .map(|id| id.get()),
            })
        });
        if cached.is_some() {
            return Ok(cached);
        }

        match self.guild_id.member(self.http.as_ref(), uid).await {
            Ok(m) => Ok(Some(MemberInfo {
                user_id,
                display_name: m.display_name().to_string(),
                avatar_url: Some(m.face()),
                voice_channel_id: self.cached_voice_channel(uid),
            })),
            Err(serenity::Error::Http(serenity::http::HttpError::UnsuccessfulRequest(resp)))
                if resp.status_code.as_u16() == 404 =>
            {
                Ok(None)
            }
            Err(e) => Err(ChannelError::MemberLookup {
                user_id,
                reason: e.to_string(),
            }),
        }
    }

    async fn voice_channel_name(&self, channel_id: u64) -> Option<String> {
        let cid = ChannelId::new(channel_id);

        let cached = self.cache.guild(self.guild_id).and_then(|guild| {
            guild
                .channels
                .get(&cid)
                .filter(|c| c.kind == ChannelType::Voice)
                .map(|c| c.name.clone())
        });
        if cached.is_some() {
            return cached;
        }

        match cid.to_channel(self.http.as_ref()).await {
            Ok(channel) => channel
                .guild()
                .filter(|c| c.guild_id == self.guild_id && c.kind == ChannelType::Voice)
                .map(|c| c.name),
            Err(e) => {
                debug!(channel_id, error = %e, "Voice channel lookup failed");
                None
            }
        }
    }

    async fn move_member(&self, user_id: u64, channel_id: u64) -> Result<(), ChannelError> {
        let edit = EditMember::new().voice_channel(ChannelId::new(channel_id));
        self.guild_id
            .edit_member(self.http.as_ref(), UserId::new(user_id), edit)
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::MoveFailed {
                user_id,
                channel_id,
                reason: e.to_string(),
            })
    }

    async fn send_text(&self, channel_id: u64, text: &str) -> Result<(), ChannelError> {
        let channel = ChannelId::new(channel_id);
        for chunk in split_message(text) {
            channel
                .say(self.http.as_ref(), chunk)
                .await
                .map_err(|e| ChannelError::SendFailed {
                    channel_id,
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }
}

/// Handler for Discord gateway events.
pub struct DiscordHandler {
    gate: Arc<MessageGate>,
    guild: GuildConfig,
}

impl DiscordHandler {
    pub fn new(gate: Arc<MessageGate>, guild: GuildConfig) -> Self {
        Self { gate, guild }
    }

    /// Required gateway intents for the bot.
    pub fn intents() -> GatewayIntents {
        GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MEMBERS
            | GatewayIntents::GUILD_VOICE_STATES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT
    }
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(bot_name = %ready.user.name, guilds = ready.guilds.len(), "discord bot ready");

        let platform = DiscordPlatform::from_context(&ctx, self.guild.guild_id);
        if let Err(e) = platform
            .send_text(self.guild.announce_channel_id, OPENING_ANNOUNCEMENT)
            .await
        {
            warn!(
                channel_id = self.guild.announce_channel_id,
                error = %e,
                "Failed to post opening announcement"
            );
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let inbound = InboundMessage {
            author_id: msg.author.id.get(),
            author_is_bot: msg.author.bot,
            channel_id: msg.channel_id.get(),
            is_direct: msg.guild_id.is_none(),
            content: msg.content.clone(),
        };

        let platform = DiscordPlatform::from_context(&ctx, self.guild.guild_id);
        if let Some(reply) = self.gate.handle(&platform, &inbound).await {
            debug!(user_id = inbound.author_id, reply_len = reply.len(), "Direct message answered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_messages_are_one_chunk() {
        assert_eq!(split_message("hello"), vec!["hello".to_string()]);
    }

    #[test]
    fn long_messages_split_on_char_boundaries() {
        let text = "é".repeat(MAX_DISCORD_LEN + 5);
        let chunks = split_message(&text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), MAX_DISCORD_LEN);
        assert_eq!(chunks[1].chars().count(), 5);
    }

    #[test]
    fn intents_cover_voice_and_dms() {
        let intents = DiscordHandler::intents();
        assert!(intents.contains(GatewayIntents::GUILD_VOICE_STATES));
        assert!(intents.contains(GatewayIntents::DIRECT_MESSAGES));
        assert!(intents.contains(GatewayIntents::MESSAGE_CONTENT));
    }
}
