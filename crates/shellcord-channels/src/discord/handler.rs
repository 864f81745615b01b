use super::adapter::DiscordAdapter;
use super::commands::{
    input_modal_id, parse_input_modal_id, ControlAction, DiscordCommands, INPUT_FIELD_ID,
};
use crate::util::mask_for_logging;
use serenity::all::{
    ActionRowComponent, Command, CommandDataOption, CommandDataOptionValue, CommandInteraction,
    CommandOptionType, ComponentInteraction, Context, CreateActionRow, CreateCommand,
    CreateCommandOption, CreateInputText, CreateInteractionResponse, CreateModal,
    EditInteractionResponse, EventHandler, GuildId, InputTextStyle, Interaction, Message,
    ModalInteraction, Ready,
};
use shellcord_core::{Dispatch, OneShotCommand, SessionManager};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Discord event handler
pub struct DiscordHandler {
    adapter: Arc<DiscordAdapter>,
    commands: DiscordCommands,
}

impl DiscordHandler {
    /// Create a new Discord event handler.
    pub fn new(adapter: Arc<DiscordAdapter>, manager: SessionManager) -> Self {
        Self {
            adapter,
            commands: DiscordCommands::new(manager),
        }
    }

    fn guild_allowed(&self, guild_id: Option<GuildId>) -> bool {
        guild_id.map_or(true, |g| self.adapter.is_guild_allowed(g.get()))
    }
}

/// Slash commands registered on ready
pub fn slash_commands() -> Vec<CreateCommand> {
    let hostname = || {
        CreateCommandOption::new(CommandOptionType::String, "hostname", "Host alias")
            .required(true)
    };
    let channel = || {
        CreateCommandOption::new(
            CommandOptionType::Channel,
            "channel",
            "Channel bound to the terminal (defaults to this one)",
        )
    };

    vec![
        CreateCommand::new("execute")
            .description("Run a command on a remote host")
            .add_option(
                CreateCommandOption::new(CommandOptionType::String, "command", "Command to run")
                    .required(true),
            )
            .add_option(hostname())
            .add_option(CreateCommandOption::new(
                CommandOptionType::Boolean,
                "continuous",
                "Keep streaming without an idle timeout",
            )),
        CreateCommand::new("terminal")
            .description("Manage persistent terminal sessions")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::SubCommand,
                    "start",
                    "Start a terminal bound to a channel",
                )
                .add_sub_option(hostname())
                .add_sub_option(channel()),
            )
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::SubCommand,
                    "stop",
                    "Stop a terminal and forget it",
                )
                .add_sub_option(channel()),
            )
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::SubCommand,
                    "pause",
                    "Pause a terminal so it can be restarted later",
                )
                .add_sub_option(channel()),
            )
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::SubCommand,
                    "restart",
                    "Restart the last paused or disconnected terminal",
                )
                .add_sub_option(channel()),
            )
            .add_option(CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "list",
                "List running sessions",
            )),
    ]
}

#[serenity::async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("Discord bot connected as {}", ready.user.name);

        match Command::set_global_commands(&ctx.http, slash_commands()).await {
            Ok(cmds) => info!("Registered {} Discord slash commands", cmds.len()),
            Err(e) => error!(error = %e, "Failed to register Discord slash commands"),
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => {
                if !self.guild_allowed(command.guild_id) {
                    debug!(guild_id = ?command.guild_id, "Guild not allowed");
                    return;
                }
                self.handle_command(&ctx, &command).await;
            }
            Interaction::Component(component) => {
                if !self.guild_allowed(component.guild_id) {
                    return;
                }
                self.handle_component(&ctx, &component).await;
            }
            Interaction::Modal(modal) => {
                if !self.guild_allowed(modal.guild_id) {
                    return;
                }
                self.handle_modal(&ctx, &modal).await;
            }
            _ => {}
        }
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        if msg.author.bot || msg.content.trim().is_empty() {
            return;
        }
        if !self.guild_allowed(msg.guild_id) {
            return;
        }

        let channel_id = msg.channel_id.get().to_string();
        let user_id = msg.author.id.get().to_string();
        let dispatch = self
            .commands
            .handle_message(&channel_id, &user_id, &msg.content)
            .await;

        if dispatch != Dispatch::Unbound {
            // SECURITY: Mask potentially sensitive content in logs
            debug!(
                channel_id = %channel_id,
                user_id = %user_id,
                text = %mask_for_logging(&msg.content),
                dispatch = ?dispatch,
                "Routed terminal input"
            );
        }
    }
}

impl DiscordHandler {
    /// Handle slash commands. Replies are ephemeral and deferred because
    /// connecting to a host can outlast the interaction deadline.
    async fn handle_command(&self, ctx: &Context, command: &CommandInteraction) {
        if let Err(e) = command.defer_ephemeral(&ctx.http).await {
            error!(error = %e, "Failed to defer slash command");
            return;
        }

        let user_id = command.user.id.get().to_string();
        let here = command.channel_id.get().to_string();

        let reply = match command.data.name.as_str() {
            "execute" => {
                let options = &command.data.options;
                let cmd = string_option(options, "command").unwrap_or_default();
                let hostname = string_option(options, "hostname").unwrap_or_default();
                let continuous = bool_option(options, "continuous").unwrap_or(false);
                info!(
                    user_id = %user_id,
                    host = %hostname,
                    command = %mask_for_logging(&cmd),
                    continuous,
                    "Execute requested"
                );
                self.commands
                    .handle_execute(&here, &user_id, &hostname, &cmd, continuous)
                    .await
            }
            "terminal" => match subcommand(command) {
                Some((name, options)) => {
                    let channel = channel_option(options, "channel").unwrap_or(here);
                    match name {
                        "start" => {
                            let hostname = string_option(options, "hostname").unwrap_or_default();
                            self.commands
                                .handle_terminal_start(&channel, &user_id, &hostname)
                                .await
                        }
                        "stop" => self.commands.handle_terminal_stop(&channel, &user_id).await,
                        "pause" => self.commands.handle_terminal_pause(&channel, &user_id).await,
                        "restart" => {
                            self.commands
                                .handle_terminal_restart(&channel, &user_id)
                                .await
                        }
                        "list" => self.commands.handle_terminal_list().await,
                        _ => "Unknown subcommand".to_string(),
                    }
                }
                None => "Unknown subcommand".to_string(),
            },
            _ => "Unknown command".to_string(),
        };

        let builder = EditInteractionResponse::new().content(reply);
        if let Err(e) = command.edit_response(&ctx.http, builder).await {
            error!(error = %e, "Failed to respond to slash command");
        }
    }

    /// Handle control buttons on live status embeds
    async fn handle_component(&self, ctx: &Context, component: &ComponentInteraction) {
        let Some((session_id, action)) = ControlAction::parse(&component.data.custom_id) else {
            debug!(custom_id = %component.data.custom_id, "Unknown component");
            log_response(
                component
                    .create_response(&ctx.http, CreateInteractionResponse::Acknowledge)
                    .await,
            );
            return;
        };
        let user_id = component.user.id.get().to_string();

        let command = match action {
            ControlAction::Input => {
                let field = CreateInputText::new(InputTextStyle::Short, "Input", INPUT_FIELD_ID)
                    .placeholder("Text to send to the command")
                    .required(true);
                let modal = CreateModal::new(input_modal_id(session_id), "Send Input")
                    .components(vec![CreateActionRow::InputText(field)]);
                let result = component
                    .create_response(&ctx.http, CreateInteractionResponse::Modal(modal))
                    .await;
                log_response(result);
                return;
            }
            ControlAction::Interrupt => OneShotCommand::Interrupt,
            ControlAction::Finish => OneShotCommand::Finish,
        };

        let dispatch = self
            .commands
            .handle_control(session_id, &user_id, command)
            .await;
        debug!(
            session_id = %session_id,
            user_id = %user_id,
            action = ?action,
            dispatch = ?dispatch,
            "Control pressed"
        );

        log_response(
            component
                .create_response(&ctx.http, CreateInteractionResponse::Acknowledge)
                .await,
        );
    }

    /// Handle send-input modal submissions
    async fn handle_modal(&self, ctx: &Context, modal: &ModalInteraction) {
        if let Some(session_id) = parse_input_modal_id(&modal.data.custom_id) {
            let text = modal
                .data
                .components
                .iter()
                .flat_map(|row| row.components.iter())
                .find_map(|c| match c {
                    ActionRowComponent::InputText(input) if input.custom_id == INPUT_FIELD_ID => {
                        input.value.clone()
                    }
                    _ => None,
                })
                .unwrap_or_default();

            if !text.is_empty() {
                let user_id = modal.user.id.get().to_string();
                let dispatch = self
                    .commands
                    .handle_control(session_id, &user_id, OneShotCommand::Input(text))
                    .await;
                debug!(session_id = %session_id, dispatch = ?dispatch, "Input submitted");
            }
        }

        log_response(
            modal
                .create_response(&ctx.http, CreateInteractionResponse::Acknowledge)
                .await,
        );
    }
}

fn log_response(result: serenity::Result<()>) {
    if let Err(e) = result {
        error!(error = %e, "Failed to respond to interaction");
    }
}

/// The invoked subcommand and its options
fn subcommand(command: &CommandInteraction) -> Option<(&str, &[CommandDataOption])> {
    command.data.options.iter().find_map(|o| match &o.value {
        CommandDataOptionValue::SubCommand(options) => Some((o.name.as_str(), options.as_slice())),
        _ => None,
    })
}

fn string_option(options: &[CommandDataOption], name: &str) -> Option<String> {
    options
        .iter()
        .find(|o| o.name == name)
        .and_then(|o| o.value.as_str().map(|s| s.to_string()))
}

fn bool_option(options: &[CommandDataOption], name: &str) -> Option<bool> {
    options
        .iter()
        .find(|o| o.name == name)
        .and_then(|o| o.value.as_bool())
}

fn channel_option(options: &[CommandDataOption], name: &str) -> Option<String> {
    options
        .iter()
        .find(|o| o.name == name)
        .and_then(|o| o.value.as_channel_id())
        .map(|id| id.get().to_string())
}
