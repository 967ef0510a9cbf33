use std::time::Duration;

use chrono_tz::Tz;

use crate::bot::{BotClient, ParseMode, SendOptions};
use crate::db::Repository;
use crate::error::Result;
use crate::models::Entry;

/// Delivery scheduler: relays unsent entries to their channels and marks
/// them sent only after the send call succeeded.
pub struct Sender<B: BotClient> {
    repository: Repository,
    bot: B,
    timezone: Tz,
}

impl<B: BotClient> Sender<B> {
    pub fn new(repository: Repository, bot: B, timezone: Tz) -> Self {
        Self {
            repository,
            bot,
            timezone,
        }
    }

    /// One delivery cycle: channels in name order, entries per channel in
    /// creation order. A failed send leaves the entry unsent for the next
    /// cycle; successes are flushed with one batched update per channel.
    pub async fn send_cycle(&self) -> Result<()> {
        tracing::info!("Sending entries...");
        let options = SendOptions {
            parse_mode: Some(ParseMode::Html),
            ..SendOptions::default()
        };
        for channel in self.repository.find_channels_ordered_by_name().await? {
            let chat = format!("@{}", channel.name);
            let mut sent = Vec::new();
            for entry in self
                .repository
                .find_unsent_entries_for_channel(channel.id)
                .await?
            {
                let text = render_entry(&entry, self.timezone);
                match self.bot.send_text(&chat, &text, &options).await {
                    Ok(()) => sent.push(entry.id),
                    Err(e) => {
                        tracing::error!("Failed to send entry {} to {}: {}", entry.id, chat, e);
                    }
                }
            }
            self.repository.mark_entries_sent(sent).await?;
        }
        tracing::info!("Sending entries done");
        Ok(())
    }

    pub async fn run(self, interval: Duration) {
        loop {
            if let Err(e) = self.send_cycle().await {
                tracing::error!("Delivery cycle failed: {}", e);
            }
            tokio::time::sleep(interval).await;
        }
    }
}

fn render_entry(entry: &Entry, timezone: Tz) -> String {
    let title = escape_html(&entry.title);
    let created_at = entry
        .created_at
        .with_timezone(&timezone)
        .format("%b %d, %Y / %H:%M");
    format!("<a href=\"{}\">{}</a> ({})", entry.link, title, created_at)
}

/// Escapes `&`, `<`, `>` and `"` only; apostrophes pass through.
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
