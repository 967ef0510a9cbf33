mod client;

pub use client::{
    BotClient, Chat, Message, ParseMode, SendOptions, TelegramClient, Update, User,
};
