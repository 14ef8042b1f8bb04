//! Fetched mailbox messages: model and storage.

mod model;
mod repository;

pub use model::{Message, MessageId, ProcessingStatus};
pub use repository::MessageRepository;
