//! Minimal gateway bot: answers "ping" with "pong".
//!
//! Run with: cargo run -p ping-bot -- path/to/gatebot.json
//!
//! Settings come from the JSON file, then `GATEBOT_*` environment
//! variables (e.g. `GATEBOT_HOST=10.0.0.2:8080`).

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Json},
};
use gatebot::{
    Bot, BotConfig, TimedTask,
    predicate::{is_friend_message, is_group_message, text_eq, text_starts_with},
};
use gatebot_transport::{AnnouncedSession, HttpHandshake, PushChannel, WsConnector, gateway_url};
use serde::Deserialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn default_host() -> String {
    "127.0.0.1:8080".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DemoConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default)]
    secure: bool,
    #[serde(default)]
    channel: PushChannel,
    #[serde(flatten)]
    bot: BotConfig,
}

fn load_config() -> anyhow::Result<DemoConfig> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "gatebot.json".to_string());
    tracing::debug!("Loading config from {path}");
    Ok(Figment::new()
        .merge(Json::file(path))
        .merge(Env::prefixed("GATEBOT_"))
        .extract()?)
}

fn register_handlers(bot: &Bot) -> anyhow::Result<()> {
    bot.on_message(
        "ping",
        Some((is_friend_message() | is_group_message()) & text_eq("ping")),
        |ctx| async move {
            let reply = ctx.quote_reply("pong")?.await?;
            tracing::debug!("Pong sent: {reply}");
            anyhow::Ok(())
        },
    );

    bot.on_message("echo", Some(text_starts_with("/echo ")), |ctx| async move {
        let text = ctx.text();
        let echoed = text.trim_start_matches("/echo ").to_string();
        ctx.reply(echoed)?.await?;
        anyhow::Ok(())
    });

    bot.on_event("log-events", None, |ctx| async move {
        tracing::info!("Event: {}", ctx.payload().kind());
        anyhow::Ok(())
    });

    if bot.config().admin.is_some() {
        bot.schedule(TimedTask::once(
            "hello-admin",
            Duration::from_secs(5),
            |bot: Bot| async move {
                bot.send_to_admin("ping-bot is up")?.await?;
                anyhow::Ok(())
            },
        )?);
        bot.schedule(TimedTask::daily(
            "good-morning",
            (8, 0, 0),
            |bot: Bot| async move {
                bot.send_to_admin("Good morning")?.await?;
                anyhow::Ok(())
            },
        )?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gatebot=debug".into()),
        )
        .init();

    let config = load_config()?;
    let url = gateway_url(
        &config.host,
        config.channel,
        &config.bot.session.credentials.verify_key,
        config.bot.session.identity,
        config.secure,
    )?;
    // The push connection opens the session; HTTP is only used to probe,
    // configure and release it.
    let handshake = AnnouncedSession::new(HttpHandshake::new(&config.host, config.secure)?);

    let bot = Bot::new(config.bot);
    register_handlers(&bot)?;
    bot.start(WsConnector::new(url), handshake).await?;

    tokio::select! {
        result = bot.wait() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
            bot.stop();
            bot.wait().await?;
        }
    }
    Ok(())
}
