use super::commands::ControlAction;
use super::config::DiscordConfig;
use super::handler::DiscordHandler;
use crate::error::{Error, Result};
use crate::util::{
    code_block, escape_fences, parse_snowflake, tail_chars, truncate_chars,
    DISCORD_EMBED_DESCRIPTION_LIMIT, DISCORD_EMBED_FIELD_LIMIT, DISCORD_MESSAGE_LIMIT,
    FENCE_CHARS,
};

use async_trait::async_trait;
use serenity::all::{
    ButtonStyle, ChannelId, Client, CreateActionRow, CreateAttachment, CreateButton, CreateEmbed,
    CreateMessage, EditMessage, GatewayIntents, MessageId,
};
use serenity::http::Http;
use shellcord_core::{
    DisplaySurface, LiveStatus, Result as EngineResult, SessionManager, StatusPhase,
    TranscriptArtifact,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

/// Discord bot adapter
pub struct DiscordAdapter {
    pub(crate) config: DiscordConfig,
    http: RwLock<Option<Arc<Http>>>,
}

impl DiscordAdapter {
    /// Create a new Discord adapter
    #[must_use]
    pub fn new(config: DiscordConfig) -> Self {
        Self {
            config,
            http: RwLock::new(None),
        }
    }

    /// Create from environment
    pub fn from_env() -> Result<Self> {
        let config = DiscordConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Check if a guild is allowed
    pub fn is_guild_allowed(&self, guild_id: u64) -> bool {
        self.config.allowed_guilds.is_empty() || self.config.allowed_guilds.contains(&guild_id)
    }

    /// Build the gateway client and keep its HTTP handle for outgoing messages.
    ///
    /// The adapter can post as soon as this returns, before the gateway is
    /// started, so restored sessions can announce themselves.
    #[instrument(skip(self, manager))]
    pub async fn connect(self: &Arc<Self>, manager: SessionManager) -> Result<Client> {
        info!("Connecting Discord bot");

        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT;

        let handler = DiscordHandler::new(self.clone(), manager);

        let client = Client::builder(&self.config.bot_token, intents)
            .event_handler(handler)
            .await
            .map_err(|e| Error::Discord(format!("Failed to create client: {}", e)))?;

        {
            let mut http_guard = self.http.write().await;
            *http_guard = Some(client.http.clone());
        }

        Ok(client)
    }

    /// Run the gateway until it stops
    pub async fn start(client: &mut Client) -> Result<()> {
        client
            .start()
            .await
            .map_err(|e| Error::Discord(format!("Client error: {}", e)))
    }

    async fn http(&self) -> Result<Arc<Http>> {
        self.http
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::Discord("Not connected".to_string()))
    }
}

#[async_trait]
impl DisplaySurface for DiscordAdapter {
    async fn post_status(&self, channel_id: &str, status: &LiveStatus) -> EngineResult<String> {
        let channel = ChannelId::new(parse_snowflake(channel_id, "channel")?);
        let http = self.http().await?;

        let builder = CreateMessage::new()
            .embed(status_embed(status))
            .components(status_controls(status));
        let sent = channel
            .send_message(&http, builder)
            .await
            .map_err(|e| Error::Discord(format!("Failed to post status: {}", e)))?;

        debug!(session_id = %status.session_id, message_id = %sent.id, "Posted live status");
        Ok(sent.id.get().to_string())
    }

    async fn update_status(
        &self,
        channel_id: &str,
        message_id: &str,
        status: &LiveStatus,
    ) -> EngineResult<()> {
        let channel = ChannelId::new(parse_snowflake(channel_id, "channel")?);
        let message = MessageId::new(parse_snowflake(message_id, "message")?);
        let http = self.http().await?;

        let builder = EditMessage::new()
            .embed(status_embed(status))
            .components(status_controls(status));
        channel
            .edit_message(&http, message, builder)
            .await
            .map_err(|e| Error::Discord(format!("Failed to edit status: {}", e)))?;

        Ok(())
    }

    async fn send_text(&self, channel_id: &str, text: &str) -> EngineResult<()> {
        let channel = ChannelId::new(parse_snowflake(channel_id, "channel")?);
        let http = self.http().await?;

        let builder = CreateMessage::new().content(code_block(text, DISCORD_MESSAGE_LIMIT));
        channel
            .send_message(&http, builder)
            .await
            .map_err(|e| Error::Discord(format!("Failed to send output: {}", e)))?;

        Ok(())
    }

    async fn send_notice(&self, channel_id: &str, text: &str) -> EngineResult<()> {
        let channel = ChannelId::new(parse_snowflake(channel_id, "channel")?);
        let http = self.http().await?;

        let builder = CreateMessage::new().content(truncate_chars(text, DISCORD_MESSAGE_LIMIT));
        channel
            .send_message(&http, builder)
            .await
            .map_err(|e| Error::Discord(format!("Failed to send notice: {}", e)))?;

        Ok(())
    }

    async fn send_transcript(
        &self,
        channel_id: &str,
        artifact: &TranscriptArtifact,
    ) -> EngineResult<()> {
        let channel = ChannelId::new(parse_snowflake(channel_id, "channel")?);
        let http = self.http().await?;

        let attachment =
            CreateAttachment::bytes(artifact.body.clone().into_bytes(), artifact.filename.as_str());
        let mut builder = CreateMessage::new().add_file(attachment);
        if !artifact.caption.is_empty() {
            builder = builder.content(truncate_chars(&artifact.caption, DISCORD_MESSAGE_LIMIT));
        }

        channel
            .send_message(&http, builder)
            .await
            .map_err(|e| Error::Discord(format!("Failed to send transcript: {}", e)))?;

        Ok(())
    }
}

fn phase_color(phase: StatusPhase) -> u32 {
    match phase {
        StatusPhase::Executing => 0x3498db,
        StatusPhase::Completed => 0x2ecc71,
        StatusPhase::Cancelled => 0xf1c40f,
        StatusPhase::TimedOut => 0xe67e22,
        StatusPhase::Failed => 0xe74c3c,
    }
}

/// Title of a live status embed
#[must_use]
pub fn status_title(status: &LiveStatus) -> String {
    format!(
        "{} Command on Host '{}'",
        status.phase.label(),
        status.hostname
    )
}

/// Longest command text echoed in a status embed
const MAX_COMMAND_CHARS: usize = 256;

const TRUNCATED_NOTICE: &str = "*Earlier output truncated.*\n";

/// Embed showing a command and its rendered output window.
///
/// Output that does not fit the description loses its oldest text, so the
/// newest lines and the closing fence always survive.
#[must_use]
pub fn status_embed(status: &LiveStatus) -> CreateEmbed {
    let command = status.command.replace('`', "'");
    let header = format!(
        "**Command:** `{}`\n",
        truncate_chars(&command, MAX_COMMAND_CHARS)
    );
    let output = if status.output.is_empty() {
        "(no output yet)".to_string()
    } else {
        escape_fences(&status.output)
    };

    let room = DISCORD_EMBED_DESCRIPTION_LIMIT.saturating_sub(
        header.chars().count() + TRUNCATED_NOTICE.chars().count() + FENCE_CHARS,
    );
    let clipped = output.chars().count() > room;

    let mut description = header;
    if status.truncated || clipped {
        description.push_str(TRUNCATED_NOTICE);
    }
    description.push_str("```\n");
    description.push_str(tail_chars(&output, room));
    description.push_str("\n```");

    let mut embed = CreateEmbed::new()
        .title(status_title(status))
        .description(description)
        .color(phase_color(status.phase));
    if let Some(note) = &status.note {
        embed = embed.field(
            "Status",
            truncate_chars(note, DISCORD_EMBED_FIELD_LIMIT),
            false,
        );
    }
    embed
}

/// Control buttons, disabled once the command is finalized
#[must_use]
pub fn status_controls(status: &LiveStatus) -> Vec<CreateActionRow> {
    let buttons = ControlAction::ALL
        .into_iter()
        .map(|action| {
            let style = match action {
                ControlAction::Interrupt => ButtonStyle::Danger,
                ControlAction::Input => ButtonStyle::Primary,
                ControlAction::Finish => ButtonStyle::Secondary,
            };
            CreateButton::new(action.custom_id(&status.session_id))
                .label(action.label())
                .style(style)
                .disabled(!status.controls_enabled)
        })
        .collect();
    vec![CreateActionRow::Buttons(buttons)]
}
