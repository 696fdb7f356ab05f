pub mod api;
pub mod controller;
pub mod dispatcher;
pub mod fetcher;
pub mod queue;
pub mod transport;

/// A text message received through getUpdates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Chat identifier, stringified
    pub chat_id: String,
    /// Message text, empty for non-text messages
    pub text: String,
    /// First name of the sender, empty when unknown
    pub sender_name: String,
    pub update_id: i64,
}
