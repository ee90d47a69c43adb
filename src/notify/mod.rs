pub mod dispatcher;
pub mod message;
pub mod telegram;

pub use dispatcher::NotificationDispatcher;
pub use telegram::{PhotoBuffer, TelegramApi};
