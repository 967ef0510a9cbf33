use std::sync::Arc;

use crate::admin::command::{CommandHandler, Reply};
use crate::bot::{BotClient, Message, ParseMode, SendOptions};

/// Access guard in front of the command dispatcher. Unauthorized or
/// unsupported messages are logged and dropped without any reply, so the
/// bot stays invisible to strangers.
pub struct MessageHandler<B: BotClient> {
    admin_user: String,
    bot: Arc<B>,
    command_handler: CommandHandler,
}

impl<B: BotClient> MessageHandler<B> {
    pub fn new(admin_user: String, bot: Arc<B>, command_handler: CommandHandler) -> Self {
        Self {
            admin_user,
            bot,
            command_handler,
        }
    }

    pub async fn handle(&self, message: &Message) {
        let Some(from) = &message.from else {
            tracing::error!("Message without sender dropped");
            return;
        };
        let id_matches = from.id.to_string() == self.admin_user;
        let username_matches = from.username.as_deref() == Some(self.admin_user.as_str());
        if !(id_matches || username_matches) {
            tracing::error!(
                "Access forbidden: id={} username={:?}",
                from.id,
                from.username
            );
            return;
        }

        if message.chat.kind != "private" {
            tracing::error!("Got unexpected chat type: {:?}", message.chat.kind);
            return;
        }
        let Some(text) = &message.text else {
            tracing::error!("Unsupported content type");
            return;
        };

        let reply = match self.command_handler.handle(text).await {
            Ok(reply) => reply,
            Err(e) => {
                // A broken command must never take the admin loop down;
                // the diagnostic goes back to the operator instead.
                let text = format!(
                    "*An error has occurred while executing a command:*\n```\n{:?}\n```",
                    e
                );
                Reply {
                    texts: vec![text],
                    options: SendOptions {
                        parse_mode: Some(ParseMode::Markdown),
                        ..SendOptions::default()
                    },
                }
            }
        };
        self.send_reply(message.chat.id, reply).await;
    }

    async fn send_reply(&self, chat_id: i64, reply: Reply) {
        let chat = chat_id.to_string();
        for text in &reply.texts {
            if let Err(e) = self.bot.send_text(&chat, text, &reply.options).await {
                tracing::error!(
                    "Failed to send reply: chat_id={} text={:?}: {}",
                    chat_id,
                    text,
                    e
                );
            }
        }
    }
}
