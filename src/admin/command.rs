use futures::future::BoxFuture;

use crate::bot::SendOptions;
use crate::db::Repository;
use crate::error::Result;

/// One positional parameter of a command.
pub struct Param {
    pub name: &'static str,
    pub required: bool,
}

pub type Handler =
    for<'a> fn(Option<&'a Repository>, Vec<Option<String>>) -> BoxFuture<'a, Result<Reply>>;

/// Static command descriptor. Registration order does not matter; help
/// output is always alphabetical.
pub struct CommandSpec {
    pub name: &'static str,
    pub desc: &'static str,
    pub params: &'static [Param],
    pub needs_store: bool,
    pub handler: Handler,
}

/// A handler's reply: one or more messages sent in order, plus send options
/// forwarded verbatim to the bot client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub texts: Vec<String>,
    pub options: SendOptions,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            texts: vec![text.into()],
            options: SendOptions::default(),
        }
    }

    pub fn multi(texts: Vec<String>, options: SendOptions) -> Self {
        Self { texts, options }
    }
}

/// Shell-style tokenizer: whitespace-separated words, single or double
/// quotes group a substring. An unterminated quote is a parse error whose
/// text is surfaced verbatim to the operator.
pub fn split(line: &str) -> std::result::Result<Vec<String>, String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    in_word = true;
                }
                c if c.is_whitespace() => {
                    if in_word {
                        parts.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                c => {
                    current.push(c);
                    in_word = true;
                }
            },
        }
    }

    if quote.is_some() {
        return Err("No closing quotation".to_string());
    }
    if in_word {
        parts.push(current);
    }
    Ok(parts)
}

fn generate_help(commands: &[CommandSpec], completion: bool) -> String {
    let mut parts = Vec::new();
    if !completion {
        parts.push("/start alias for /help".to_string());
        parts.push("/help show this message".to_string());
    }

    let mut sorted: Vec<&CommandSpec> = commands.iter().collect();
    sorted.sort_by_key(|c| c.name);

    for command in sorted {
        let args = command
            .params
            .iter()
            .map(|p| {
                if p.required {
                    format!("<{}>", p.name)
                } else {
                    format!("[{}]", p.name)
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        if completion {
            let args = if args.is_empty() {
                String::new()
            } else {
                format!(": {}", args)
            };
            parts.push(format!("{} - {}{}", command.name, command.desc, args));
        } else {
            let line = [format!("/{}", command.name), args, command.desc.to_string()]
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            parts.push(line);
        }
    }
    parts.join("\n")
}

pub struct CommandHandler {
    commands: Vec<CommandSpec>,
    repository: Repository,
    help_message: String,
    completion_message: String,
}

impl CommandHandler {
    pub fn new(commands: Vec<CommandSpec>, repository: Repository) -> Self {
        let help_message = generate_help(&commands, false);
        let completion_message = generate_help(&commands, true);
        Self {
            commands,
            repository,
            help_message,
            completion_message,
        }
    }

    /// Dispatches one raw command line. Validation problems come back as
    /// operator-visible replies; only unexpected handler failures propagate
    /// as errors (the message layer turns those into diagnostic replies).
    pub async fn handle(&self, raw_command: &str) -> Result<Reply> {
        let parts = match split(raw_command) {
            Ok(parts) => parts,
            Err(msg) => return Ok(Reply::text(msg)),
        };

        let Some(first) = parts.first() else {
            return Ok(Reply::text("Empty command"));
        };
        let name = first.strip_prefix('/').unwrap_or(first);
        let raw_args = &parts[1..];

        if name == "start" || name == "help" {
            return Ok(if raw_args.is_empty() {
                Reply::text(&self.help_message)
            } else {
                Reply::text("Too many arguments")
            });
        }
        if name == "listcommands" {
            return Ok(if raw_args.is_empty() {
                Reply::text(&self.completion_message)
            } else {
                Reply::text("Too many arguments")
            });
        }

        let Some(command) = self.commands.iter().find(|c| c.name == name) else {
            return Ok(Reply::text("Command not found"));
        };

        if raw_args.len() > command.params.len() {
            return Ok(Reply::text("Too many arguments"));
        }

        let mut args = Vec::with_capacity(command.params.len());
        for (idx, param) in command.params.iter().enumerate() {
            let value = raw_args.get(idx).cloned();
            if value.is_none() && param.required {
                return Ok(Reply::text(format!("{} is required", param.name)));
            }
            args.push(value);
        }

        let store = command.needs_store.then_some(&self.repository);
        (command.handler)(store, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::handlers::command_table;

    #[test]
    fn split_plain_words() {
        assert_eq!(split("addchannel test").unwrap(), vec!["addchannel", "test"]);
        assert_eq!(split("  spaced   out  ").unwrap(), vec!["spaced", "out"]);
        assert!(split("").unwrap().is_empty());
    }

    #[test]
    fn split_honors_quotes() {
        assert_eq!(
            split("addfeed ch \"http://a/rss?x=1 2\"").unwrap(),
            vec!["addfeed", "ch", "http://a/rss?x=1 2"]
        );
        assert_eq!(split("a 'b c' d").unwrap(), vec!["a", "b c", "d"]);
        assert_eq!(split("''").unwrap(), vec![""]);
    }

    #[test]
    fn split_unterminated_quote_is_error() {
        assert_eq!(split("\"addfeed ch").unwrap_err(), "No closing quotation");
        assert_eq!(split("addfeed 'ch").unwrap_err(), "No closing quotation");
    }

    #[test]
    fn help_is_alphabetical_with_builtins() {
        let help = generate_help(&command_table(), false);
        assert_eq!(
            help,
            [
                "/start alias for /help",
                "/help show this message",
                "/addchannel <name> add channel",
                "/addfeed <channel> <url> add feed to channel",
                "/delchannel <name> delete channel",
                "/delfeed <channel> <url> delete feed from channel",
                "/listchannels show channels",
                "/listfeeds show feeds",
            ]
            .join("\n")
        );
    }

    #[test]
    fn completion_listing_format() {
        let completion = generate_help(&command_table(), true);
        assert_eq!(
            completion,
            [
                "addchannel - add channel: <name>",
                "addfeed - add feed to channel: <channel> <url>",
                "delchannel - delete channel: <name>",
                "delfeed - delete feed from channel: <channel> <url>",
                "listchannels - show channels",
                "listfeeds - show feeds",
            ]
            .join("\n")
        );
    }

    async fn temp_handler() -> (CommandHandler, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let repository = Repository::new(path.to_str().unwrap()).await.unwrap();
        (CommandHandler::new(command_table(), repository), dir)
    }

    #[tokio::test]
    async fn dispatch_validation_replies() {
        let (handler, _dir) = temp_handler().await;

        let reply = |r: Reply| r.texts[0].clone();

        assert_eq!(reply(handler.handle("").await.unwrap()), "Empty command");
        assert_eq!(
            reply(handler.handle("/unknown").await.unwrap()),
            "Command not found"
        );
        assert_eq!(
            reply(handler.handle("/start extra").await.unwrap()),
            "Too many arguments"
        );
        assert_eq!(
            reply(handler.handle("/help extra").await.unwrap()),
            "Too many arguments"
        );
        assert_eq!(
            reply(handler.handle("/listcommands extra").await.unwrap()),
            "Too many arguments"
        );
        assert_eq!(
            reply(handler.handle("/addchannel a b").await.unwrap()),
            "Too many arguments"
        );
        assert_eq!(
            reply(handler.handle("/addchannel").await.unwrap()),
            "name is required"
        );
    }

    #[tokio::test]
    async fn unterminated_quote_surfaced_verbatim() {
        let (handler, _dir) = temp_handler().await;
        let reply = handler.handle("\"addfeed ch").await.unwrap();
        assert_eq!(reply.texts, vec!["No closing quotation"]);
    }

    #[tokio::test]
    async fn help_reply_matches_generated_text() {
        let (handler, _dir) = temp_handler().await;
        let start = handler.handle("/start").await.unwrap();
        let help = handler.handle("/help").await.unwrap();
        assert_eq!(start, help);
        assert!(help.texts[0].starts_with("/start alias for /help"));

        let completion = handler.handle("/listcommands").await.unwrap();
        assert!(completion.texts[0].starts_with("addchannel - add channel"));
    }

    #[tokio::test]
    async fn leading_slash_is_optional() {
        let (handler, _dir) = temp_handler().await;
        let with = handler.handle("/listchannels").await.unwrap();
        let without = handler.handle("listchannels").await.unwrap();
        assert_eq!(with, without);
    }
}
