use futures::future::BoxFuture;

use crate::admin::command::{CommandSpec, Param, Reply};
use crate::bot::{ParseMode, SendOptions};
use crate::db::Repository;
use crate::error::Result;
use crate::models::ChannelFeed;

/// Feed URLs per message chunk in the listfeeds reply.
const FEEDS_PER_CHUNK: usize = 10;

/// The commands operating on the data model. Registration order is
/// irrelevant; display order is always alphabetical.
pub fn command_table() -> Vec<CommandSpec> {
    vec![
        CommandSpec {
            name: "listchannels",
            desc: "show channels",
            params: &[],
            needs_store: true,
            handler: list_channels,
        },
        CommandSpec {
            name: "addchannel",
            desc: "add channel",
            params: &[Param {
                name: "name",
                required: true,
            }],
            needs_store: true,
            handler: add_channel,
        },
        CommandSpec {
            name: "delchannel",
            desc: "delete channel",
            params: &[Param {
                name: "name",
                required: true,
            }],
            needs_store: true,
            handler: del_channel,
        },
        CommandSpec {
            name: "listfeeds",
            desc: "show feeds",
            params: &[],
            needs_store: true,
            handler: list_feeds,
        },
        CommandSpec {
            name: "addfeed",
            desc: "add feed to channel",
            params: &[
                Param {
                    name: "channel",
                    required: true,
                },
                Param {
                    name: "url",
                    required: true,
                },
            ],
            needs_store: true,
            handler: add_feed,
        },
        CommandSpec {
            name: "delfeed",
            desc: "delete feed from channel",
            params: &[
                Param {
                    name: "channel",
                    required: true,
                },
                Param {
                    name: "url",
                    required: true,
                },
            ],
            needs_store: true,
            handler: del_feed,
        },
    ]
}

fn require_store(repo: Option<&Repository>) -> Result<&Repository> {
    repo.ok_or_else(|| anyhow::anyhow!("Handler requires a store connection").into())
}

fn arg(args: &[Option<String>], idx: usize) -> String {
    args.get(idx).cloned().flatten().unwrap_or_default()
}

fn clean_channel_name(name: &str) -> &str {
    name.strip_prefix('@').unwrap_or(name)
}

fn list_channels(repo: Option<&Repository>, _args: Vec<Option<String>>) -> BoxFuture<'_, Result<Reply>> {
    Box::pin(async move {
        let repo = require_store(repo)?;
        let channels = repo.find_channels_ordered_by_name().await?;
        if channels.is_empty() {
            return Ok(Reply::text("There are no channels to display"));
        }
        let listing = channels
            .into_iter()
            .map(|c| format!("@{}", c.name))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(Reply::text(listing))
    })
}

fn add_channel(repo: Option<&Repository>, args: Vec<Option<String>>) -> BoxFuture<'_, Result<Reply>> {
    Box::pin(async move {
        let repo = require_store(repo)?;
        let name = arg(&args, 0);
        let name = clean_channel_name(&name);
        if name.is_empty() {
            return Ok(Reply::text("Bad channel name"));
        }
        if repo.find_channel_by_name(name).await?.is_some() {
            return Ok(Reply::text("Channel already exists"));
        }
        repo.insert_channel(name).await?;
        Ok(Reply::text("OK"))
    })
}

fn del_channel(repo: Option<&Repository>, args: Vec<Option<String>>) -> BoxFuture<'_, Result<Reply>> {
    Box::pin(async move {
        let repo = require_store(repo)?;
        let name = arg(&args, 0);
        let name = clean_channel_name(&name);
        if name.is_empty() {
            return Ok(Reply::text("Bad channel name"));
        }
        let Some(channel) = repo.find_channel_by_name(name).await? else {
            return Ok(Reply::text(format!("Channel \"{}\" not found", name)));
        };
        repo.delete_entries_for_channel(channel.id).await?;
        repo.delete_feeds_for_channel(channel.id).await?;
        repo.delete_channel(channel.id).await?;
        Ok(Reply::text("OK"))
    })
}

fn list_feeds(repo: Option<&Repository>, _args: Vec<Option<String>>) -> BoxFuture<'_, Result<Reply>> {
    Box::pin(async move {
        let repo = require_store(repo)?;
        let rows = repo.find_feeds_with_channels().await?;
        let options = SendOptions {
            parse_mode: Some(ParseMode::Html),
            disable_web_page_preview: true,
        };
        if rows.is_empty() {
            return Ok(Reply::multi(
                vec!["There are no feeds to display".to_string()],
                options,
            ));
        }
        Ok(Reply::multi(group_feeds(&rows), options))
    })
}

/// Rows arrive ordered by channel then url; each channel becomes a bold
/// header message followed by its urls in chunks of ten.
fn group_feeds(rows: &[ChannelFeed]) -> Vec<String> {
    let mut texts = Vec::new();
    let mut idx = 0;
    while idx < rows.len() {
        let channel = &rows[idx].channel;
        let end = rows[idx..]
            .iter()
            .position(|r| &r.channel != channel)
            .map(|offset| idx + offset)
            .unwrap_or(rows.len());
        texts.push(format!("<b>@{}</b>", channel));
        for chunk in rows[idx..end].chunks(FEEDS_PER_CHUNK) {
            texts.push(
                chunk
                    .iter()
                    .map(|r| r.url.as_str())
                    .collect::<Vec<_>>()
                    .join("\n"),
            );
        }
        idx = end;
    }
    texts
}

fn add_feed(repo: Option<&Repository>, args: Vec<Option<String>>) -> BoxFuture<'_, Result<Reply>> {
    Box::pin(async move {
        let repo = require_store(repo)?;
        let channel = arg(&args, 0);
        let channel = clean_channel_name(&channel);
        let url = arg(&args, 1);
        if channel.is_empty() {
            return Ok(Reply::text("Bad channel name"));
        }
        if url.is_empty() {
            return Ok(Reply::text("Bad feed URL"));
        }
        let Some(channel_obj) = repo.find_channel_by_name(channel).await? else {
            return Ok(Reply::text(format!("Channel \"{}\" not found", channel)));
        };
        repo.insert_feed(channel_obj.id, &url).await?;
        Ok(Reply::text("OK"))
    })
}

fn del_feed(repo: Option<&Repository>, args: Vec<Option<String>>) -> BoxFuture<'_, Result<Reply>> {
    Box::pin(async move {
        let repo = require_store(repo)?;
        let channel = arg(&args, 0);
        let channel = clean_channel_name(&channel);
        let url = arg(&args, 1);
        if channel.is_empty() {
            return Ok(Reply::text("Bad channel name"));
        }
        if url.is_empty() {
            return Ok(Reply::text("Bad feed URL"));
        }
        let Some(channel_obj) = repo.find_channel_by_name(channel).await? else {
            return Ok(Reply::text(format!("Channel \"{}\" not found", channel)));
        };
        let Some(feed) = repo.find_feed(channel_obj.id, &url).await? else {
            return Ok(Reply::text(format!("Feed \"{}\" not found", url)));
        };
        repo.delete_entries_for_feed(feed.id).await?;
        repo.delete_feed(feed.id).await?;
        Ok(Reply::text("OK"))
    })
}
