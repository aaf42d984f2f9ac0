//! Echo Bot
//!
//! A small Weft host with one plugin type, `echo`, offering:
//!
//! - `{prefix}ping`: answers with a notice
//! - `{prefix}echo <text>`: repeats the text back as a reply
//! - a passive `link` command that logs every URL posted in a room
//!
//! Accounts and plugin instances come from the configuration file:
//!
//! ```toml
//! [[accounts]]
//! user_id = "@echo:example.org"
//! homeserver = "https://example.org"
//! access_token = "..."
//! autojoin = true
//!
//! [[plugins]]
//! id = "echo"
//! type = "echo"
//! user_id = "@echo:example.org"
//!
//! [plugin_config.echo]
//! prefix = "!"
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package echo-bot -- --config weft.toml
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn};
use weft::prelude::*;

#[derive(Debug, Parser)]
#[command(name = "echo-bot", about = "Ping/echo bot on the Weft host")]
struct Args {
    /// Configuration file; searched for in the usual places when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile (overrides WEFT_PROFILE).
    #[arg(short, long)]
    profile: Option<String>,
}

// ============================================================================
// Plugin
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(default)]
struct EchoConfig {
    prefix: String,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self { prefix: "!".into() }
    }
}

struct Echo {
    proxy: AccountProxy,
    config: EchoConfig,
}

impl Echo {
    fn new(init: PluginInit) -> Self {
        let config = init.config().unwrap_or_else(|e| {
            warn!(plugin = %init.record.id, error = %e, "Invalid echo config, using defaults");
            EchoConfig::default()
        });
        Self {
            proxy: init.proxy,
            config,
        }
    }

    fn ping(&self) -> String {
        format!("{}ping", self.config.prefix)
    }

    fn echo(&self) -> String {
        format!("{}echo $text", self.config.prefix)
    }

    fn spec(&self) -> CommandSpec {
        CommandSpec::new()
            .command(Command::new(self.ping()).description("Check that the bot is alive"))
            .command(
                Command::new(self.echo())
                    .description("Repeat a message")
                    .argument("$text", Argument::required(".+").description("Text to repeat")),
            )
            .passive(PassiveCommand::new("link", r"https?://\S+"))
    }
}

#[async_trait]
impl Plugin for Echo {
    async fn start(&self) -> PluginResult {
        self.proxy.set_spec(self.spec()).await?;

        self.proxy
            .add_command_handler(&self.ping(), |ctx: EventContext| async move {
                if let Err(e) = ctx.respond("pong").await {
                    warn!(error = %e, "Failed to answer ping");
                }
                CommandResult::Continue
            });

        self.proxy
            .add_command_handler(&self.echo(), |ctx: EventContext| async move {
                let text = ctx.argument("$text").unwrap_or_default().to_string();
                if let Err(e) = ctx.reply(&text).await {
                    warn!(error = %e, "Failed to echo");
                }
                CommandResult::StopAll
            });

        self.proxy
            .add_command_handler("link", |ctx: EventContext| async move {
                if let Some(links) = ctx.passive("link") {
                    for capture in &links.captures {
                        info!(room_id = %ctx.event().room_id, url = %capture[0], "Link posted");
                    }
                }
                CommandResult::Continue
            });

        self.proxy
            .add_listener(types::ROOM_MEMBER, |ctx: EventContext| async move {
                let event = ctx.event();
                if let Some(membership) = event.membership() {
                    info!(
                        room_id = %event.room_id,
                        user = event.state_key.as_deref().unwrap_or_default(),
                        ?membership,
                        "Membership changed"
                    );
                }
                Propagation::Continue
            });

        info!(account = %self.proxy.user_id(), prefix = %self.config.prefix, "Echo plugin ready");
        Ok(())
    }

    async fn stop(&self) {
        info!(account = %self.proxy.user_id(), "Echo plugin stopping");
    }
}

static ECHO: PluginDescriptor = PluginDescriptor {
    api_version: WEFT_PLUGIN_API_VERSION,
    name: "echo",
    version: env!("CARGO_PKG_VERSION"),
    create: |init| Box::new(Echo::new(init)),
};

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = WeftRuntime::builder();
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = &args.profile {
        builder = builder.profile(profile);
    }

    let runtime = builder.build()?;
    runtime.register_plugin(ECHO)?;
    runtime.run().await?;

    Ok(())
}
