use std::sync::Arc;
use std::time::Duration;

mod admin;
mod bot;
mod config;
mod db;
mod delivery;
mod error;
mod feed;
mod models;

use admin::{command_table, CommandHandler, MessageHandler};
use bot::TelegramClient;
use config::Config;
use db::Repository;
use delivery::Sender;
use error::Result;
use feed::{FeedFetcher, Ingestor};

#[tokio::main]
async fn main() -> Result<()> {
    // Config problems are fatal before anything starts serving.
    let config = Config::load()?;

    let default_level = if config.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .init();
    tracing::info!("Feedrelay started");

    let timezone = config.display_timezone()?;
    let proxy = config.proxy.as_deref();

    let repository = Repository::new(&config.db_path).await?;
    let fetcher = FeedFetcher::new(proxy)?;
    let client = Arc::new(TelegramClient::new(&config.bot_token, proxy)?);

    let ingestor = Ingestor::new(repository.clone(), fetcher, config.parse_timeout_secs);
    let sender = Sender::new(repository.clone(), client.clone(), timezone);
    let command_handler = CommandHandler::new(command_table(), repository.clone());
    let message_handler =
        MessageHandler::new(config.admin_user.clone(), client.clone(), command_handler);

    let ingest_task = tokio::spawn(ingestor.run(Duration::from_secs(config.parse_interval_secs)));
    let delivery_task = tokio::spawn(sender.run(Duration::from_secs(config.send_interval_secs)));
    let admin_task = tokio::spawn(admin::run(client, message_handler));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    // Cycles persist their effects before recording success, so aborting
    // mid-cycle cannot corrupt was_sent/updated_at.
    ingest_task.abort();
    delivery_task.abort();
    admin_task.abort();

    Ok(())
}
