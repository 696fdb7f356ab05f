use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{debug, info};

use super::InboundMessage;

/// Something a command string can be routed to.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// `text` is the full message text, arguments included.
    async fn invoke(&self, chat_id: &str, text: &str, sender_name: &str);
}

/// Closures returning a boxed future can be registered directly.
#[async_trait]
impl<F> CommandHandler for F
where
    F: Fn(String, String, String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync,
{
    async fn invoke(&self, chat_id: &str, text: &str, sender_name: &str) {
        (self)(
            chat_id.to_string(),
            text.to_string(),
            sender_name.to_string(),
        )
        .await
    }
}

/// Routes inbound text to a registered handler, falling back to a default one.
pub struct CommandDispatcher {
    commands: RwLock<HashMap<String, Arc<dyn CommandHandler>>>,
    default_handler: RwLock<Option<Arc<dyn CommandHandler>>>,
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self {
            commands: RwLock::new(HashMap::new()),
            default_handler: RwLock::new(None),
        }
    }

    /// Register `handler` under the exact string `command`, replacing any previous one.
    pub fn register(&self, command: &str, handler: Arc<dyn CommandHandler>) {
        let mut commands = self
            .commands
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        commands.insert(command.to_string(), handler);
        info!("Command registered: {}", command);
    }

    pub fn set_default(&self, handler: Arc<dyn CommandHandler>) {
        let mut default_handler = self
            .default_handler
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *default_handler = Some(handler);
    }

    #[allow(dead_code)]
    pub fn is_registered(&self, command: &str) -> bool {
        self.commands
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(command)
    }

    /// Exact match first, then the token before the first space, then the default.
    fn resolve(&self, text: &str) -> Option<Arc<dyn CommandHandler>> {
        {
            let commands = self
                .commands
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            if let Some(handler) = commands.get(text) {
                return Some(Arc::clone(handler));
            }

            if let Some((token, _)) = text.split_once(' ') {
                if let Some(handler) = commands.get(token) {
                    return Some(Arc::clone(handler));
                }
            }
        }

        self.default_handler
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub async fn dispatch(&self, msg: InboundMessage) {
        if msg.text.is_empty() {
            return;
        }

        info!("Message from {}: {}", msg.sender_name, msg.text);

        match self.resolve(&msg.text) {
            Some(handler) => {
                handler
                    .invoke(&msg.chat_id, &msg.text, &msg.sender_name)
                    .await
            }
            None => debug!("No handler for update {}, dropped", msg.update_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every invocation as (chat_id, text, sender_name).
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(String, String, String)>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<(String, String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandHandler for Recorder {
        async fn invoke(&self, chat_id: &str, text: &str, sender_name: &str) {
            self.calls.lock().unwrap().push((
                chat_id.to_string(),
                text.to_string(),
                sender_name.to_string(),
            ));
        }
    }

    fn message(text: &str) -> InboundMessage {
        InboundMessage {
            chat_id: "42".to_string(),
            text: text.to_string(),
            sender_name: "Ann".to_string(),
            update_id: 7,
        }
    }

    fn setup() -> (CommandDispatcher, Arc<Recorder>, Arc<Recorder>) {
        let dispatcher = CommandDispatcher::new();
        let servo = Arc::new(Recorder::default());
        let fallback = Arc::new(Recorder::default());
        dispatcher.register("/servo", servo.clone());
        dispatcher.set_default(fallback.clone());
        (dispatcher, servo, fallback)
    }

    #[tokio::test]
    async fn exact_match_gets_the_literal_text() {
        let (dispatcher, servo, fallback) = setup();

        dispatcher.dispatch(message("/servo")).await;

        assert_eq!(
            servo.calls(),
            vec![("42".to_string(), "/servo".to_string(), "Ann".to_string())]
        );
        assert!(fallback.calls().is_empty());
    }

    #[tokio::test]
    async fn command_token_match_forwards_full_text() {
        let (dispatcher, servo, fallback) = setup();

        dispatcher.dispatch(message("/servo 90")).await;

        assert_eq!(servo.calls()[0].1, "/servo 90");
        assert!(fallback.calls().is_empty());
    }

    #[tokio::test]
    async fn only_the_first_space_splits_the_token() {
        let (dispatcher, servo, _) = setup();

        dispatcher.dispatch(message("/servo 90 fast")).await;

        assert_eq!(servo.calls()[0].1, "/servo 90 fast");
    }

    #[tokio::test]
    async fn unknown_command_goes_to_default() {
        let (dispatcher, servo, fallback) = setup();

        dispatcher.dispatch(message("/unknown")).await;
        dispatcher.dispatch(message("/unknown with args")).await;

        assert!(servo.calls().is_empty());
        let texts: Vec<String> = fallback.calls().into_iter().map(|c| c.1).collect();
        assert_eq!(texts, vec!["/unknown", "/unknown with args"]);
    }

    #[tokio::test]
    async fn empty_text_invokes_nothing() {
        let (dispatcher, servo, fallback) = setup();

        dispatcher.dispatch(message("")).await;

        assert!(servo.calls().is_empty());
        assert!(fallback.calls().is_empty());
    }

    #[tokio::test]
    async fn without_default_unknown_text_is_dropped() {
        let dispatcher = CommandDispatcher::new();
        let servo = Arc::new(Recorder::default());
        dispatcher.register("/servo", servo.clone());

        dispatcher.dispatch(message("hello")).await;

        assert!(servo.calls().is_empty());
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let (dispatcher, first, _) = setup();
        let second = Arc::new(Recorder::default());
        dispatcher.register("/servo", second.clone());

        dispatcher.dispatch(message("/servo")).await;

        assert!(first.calls().is_empty());
        assert_eq!(second.calls().len(), 1);
    }

    #[tokio::test]
    async fn closures_can_be_registered() {
        let dispatcher = CommandDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let handler = move |chat_id: String, text: String, _sender: String| {
            let sink = Arc::clone(&sink);
            Box::pin(async move {
                sink.lock().unwrap().push(format!("{}:{}", chat_id, text));
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        };
        dispatcher.register("/ping", Arc::new(handler));

        dispatcher.dispatch(message("/ping")).await;

        assert_eq!(*seen.lock().unwrap(), vec!["42:/ping".to_string()]);
    }
}
