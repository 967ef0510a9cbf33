pub mod command;
pub mod handlers;
pub mod message;

use std::sync::Arc;
use std::time::Duration;

use crate::bot::TelegramClient;

pub use command::CommandHandler;
pub use handlers::command_table;
pub use message::MessageHandler;

/// Long-poll loop feeding inbound admin messages to the access guard.
/// A transport error backs off briefly and resumes; the loop never exits.
pub async fn run(client: Arc<TelegramClient>, handler: MessageHandler<TelegramClient>) {
    let mut offset = None;
    loop {
        match client.get_updates(offset).await {
            Ok(updates) => {
                for update in updates {
                    offset = Some(update.update_id + 1);
                    if let Some(message) = update.message {
                        handler.handle(&message).await;
                    }
                }
            }
            Err(e) => {
                tracing::error!("Failed to fetch updates: {}", e);
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}
