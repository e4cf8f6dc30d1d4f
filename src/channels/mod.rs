pub mod telegram;
pub mod traits;

pub use telegram::{MAX_MESSAGE_CHARS, TelegramChannel, parse_update, split_message};
pub use traits::{Channel, ChannelMessage, ParseMode, SendMessage};
