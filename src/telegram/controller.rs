use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::api::TelegramClient;
use super::dispatcher::{CommandDispatcher, CommandHandler};
use super::fetcher::UpdateFetcher;
use super::queue::MessageQueue;
use crate::config::TelegramConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingState {
    Idle,
    Polling,
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// State shared between the controller and its polling task.
struct Shared {
    fetcher: UpdateFetcher,
    queue: MessageQueue,
    dispatcher: CommandDispatcher,
    poll_interval: Duration,
}

impl Shared {
    /// One polling cycle: fetch, then drain the queue through the dispatcher.
    /// A panicking handler loses its own message only.
    async fn process_updates(&self) {
        self.fetcher.fetch_and_enqueue(&self.queue).await;

        while let Some(msg) = self.queue.pop_nonblocking() {
            let update_id = msg.update_id;
            if let Err(payload) = AssertUnwindSafe(self.dispatcher.dispatch(msg))
                .catch_unwind()
                .await
            {
                error!(
                    "Handler for update {} panicked: {}",
                    update_id,
                    panic_message(&*payload)
                );
            }
        }
    }

    async fn polling_loop(self: Arc<Self>) {
        info!("Polling task started");

        loop {
            self.process_updates().await;
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Owns the background polling task and the command table.
///
/// Commands are meant to be registered before [`BotController::start_polling`].
/// Stopping aborts the task where it stands, so a request in flight is abandoned.
/// Replies go out through [`BotController::client`].
pub struct BotController {
    client: Arc<TelegramClient>,
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BotController {
    pub fn new(client: Arc<TelegramClient>, config: &TelegramConfig) -> Self {
        let shared = Shared {
            fetcher: UpdateFetcher::new(Arc::clone(&client), config.poll_timeout_secs),
            queue: MessageQueue::new(config.queue_capacity),
            dispatcher: CommandDispatcher::new(),
            poll_interval: config.poll_interval(),
        };

        Self {
            client,
            shared: Arc::new(shared),
            task: Mutex::new(None),
        }
    }

    fn task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn client(&self) -> Arc<TelegramClient> {
        Arc::clone(&self.client)
    }

    /// `Polling` while the background task is alive.
    pub fn state(&self) -> PollingState {
        if is_alive(&self.task()) {
            PollingState::Polling
        } else {
            PollingState::Idle
        }
    }

    /// Offset cursor of the update fetcher.
    pub fn last_update_id(&self) -> i64 {
        self.shared.fetcher.last_update_id()
    }

    pub fn register_command(&self, command: &str, handler: Arc<dyn CommandHandler>) {
        self.shared.dispatcher.register(command, handler);
    }

    pub fn set_default_handler(&self, handler: Arc<dyn CommandHandler>) {
        self.shared.dispatcher.set_default(handler);
    }

    #[allow(dead_code)]
    pub fn is_registered(&self, command: &str) -> bool {
        self.shared.dispatcher.is_registered(command)
    }

    /// Spawns the polling task on the current Tokio runtime.
    /// Calling it while already polling only logs a warning.
    pub fn start_polling(&self) -> Result<()> {
        let mut task = self.task();

        if is_alive(&task) {
            warn!("Polling has already started");
            return Ok(());
        }
        if task.is_some() {
            warn!("Previous polling task ended unexpectedly, restarting");
        }

        let runtime = Handle::try_current().context("Polling needs a Tokio runtime")?;
        *task = Some(runtime.spawn(Arc::clone(&self.shared).polling_loop()));

        info!("Polling started");
        Ok(())
    }

    pub fn stop_polling(&self) {
        if let Some(handle) = self.task().take() {
            handle.abort();
            info!("Polling stopped");
        }
    }
}

fn is_alive(task: &Option<JoinHandle<()>>) -> bool {
    task.as_ref().is_some_and(|handle| !handle.is_finished())
}

impl Drop for BotController {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::testing::ScriptedTransport;
    use std::future::Future;
    use std::pin::Pin;

    fn config() -> TelegramConfig {
        crate::config::Config::parse(
            "[telegram]\nbot_token = \"T\"\napi_base_url = \"http://api\"\npoll_interval_ms = 10\n",
        )
        .unwrap()
        .telegram
    }

    fn controller(transport: &Arc<ScriptedTransport>) -> BotController {
        let config = config();
        let client = TelegramClient::new(transport.clone(), &config.api_base_url, &config.bot_token);
        BotController::new(Arc::new(client), &config)
    }

    /// Handler that echoes the received text back to the chat.
    fn echo(client: Arc<TelegramClient>) -> Arc<dyn CommandHandler> {
        Arc::new(move |chat_id: String, text: String, _sender: String| {
            let client = Arc::clone(&client);
            Box::pin(async move {
                client.send_message(&chat_id, &format!("echo {}", text)).await;
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        })
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met in time");
    }

    #[tokio::test]
    async fn starts_idle() {
        let transport = Arc::new(ScriptedTransport::new());
        let bot = controller(&transport);

        assert_eq!(bot.state(), PollingState::Idle);
        assert_eq!(bot.last_update_id(), 0);
    }

    #[tokio::test]
    async fn polling_loop_dispatches_fetched_messages() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_get_response(
            r#"{"ok":true,"result":[
                {"update_id":100,"message":{"chat":{"id":7},"text":"/echo hi","from":{"first_name":"Ann"}}},
                {"update_id":101,"message":{"chat":{"id":7},"text":"/echo"}}
            ]}"#,
        );
        let bot = controller(&transport);
        bot.register_command("/echo", echo(bot.client()));

        bot.start_polling().unwrap();
        wait_for(|| transport.posts().len() == 2 && transport.gets().len() >= 2).await;
        bot.stop_polling();

        assert_eq!(transport.sent_texts(), vec!["echo /echo hi", "echo /echo"]);
        assert_eq!(bot.last_update_id(), 101);

        let gets = transport.gets();
        assert_eq!(gets[0], "http://api/botT/getUpdates?timeout=10");
        assert_eq!(gets[1], "http://api/botT/getUpdates?timeout=10&offset=102");
    }

    #[tokio::test]
    async fn second_start_keeps_a_single_loop() {
        let transport = Arc::new(ScriptedTransport::hanging());
        let bot = controller(&transport);

        bot.start_polling().unwrap();
        bot.start_polling().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(bot.state(), PollingState::Polling);
        assert_eq!(transport.gets().len(), 1);

        bot.stop_polling();
        assert_eq!(bot.state(), PollingState::Idle);
    }

    #[tokio::test]
    async fn can_restart_after_stop() {
        let transport = Arc::new(ScriptedTransport::hanging());
        let bot = controller(&transport);

        bot.start_polling().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        bot.stop_polling();
        bot.start_polling().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(bot.state(), PollingState::Polling);
        assert_eq!(transport.gets().len(), 2);
    }

    #[tokio::test]
    async fn stop_ends_the_loop() {
        let transport = Arc::new(ScriptedTransport::new());
        let bot = controller(&transport);

        bot.start_polling().unwrap();
        wait_for(|| transport.gets().len() >= 2).await;
        bot.stop_polling();
        let fetched = transport.gets().len();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(bot.state(), PollingState::Idle);
        assert_eq!(transport.gets().len(), fetched);
    }

    #[tokio::test]
    async fn drop_stops_polling() {
        let transport = Arc::new(ScriptedTransport::hanging());
        let bot = controller(&transport);

        bot.start_polling().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(bot);
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The aborted task released its handle on the client and transport.
        assert_eq!(Arc::strong_count(&transport), 1);
    }

    #[test]
    fn start_outside_runtime_is_an_error() {
        let transport = Arc::new(ScriptedTransport::new());
        let bot = controller(&transport);

        assert!(bot.start_polling().is_err());
        assert_eq!(bot.state(), PollingState::Idle);
    }

    #[tokio::test]
    async fn send_message_goes_through_the_client() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_post_response(r#"{"ok":false}"#);
        let bot = controller(&transport);

        assert!(!bot.client().send_message("1", "first").await);
        assert!(bot.client().send_message("1", "second").await);
        assert_eq!(transport.sent_texts(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn panicking_handler_does_not_stop_polling() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_get_response(
            r#"{"ok":true,"result":[
                {"update_id":1,"message":{"chat":{"id":7},"text":"/boom"}},
                {"update_id":2,"message":{"chat":{"id":7},"text":"/echo after"}}
            ]}"#,
        );
        let bot = controller(&transport);
        bot.register_command(
            "/boom",
            Arc::new(|_chat: String, _text: String, _sender: String| {
                Box::pin(async move { panic!("handler failure") })
                    as Pin<Box<dyn Future<Output = ()> + Send>>
            }),
        );
        bot.register_command("/echo", echo(bot.client()));

        bot.start_polling().unwrap();
        wait_for(|| transport.posts().len() == 1 && transport.gets().len() >= 3).await;

        assert_eq!(bot.state(), PollingState::Polling);
        assert_eq!(transport.sent_texts(), vec!["echo /echo after"]);
        assert_eq!(
            transport.gets()[1],
            "http://api/botT/getUpdates?timeout=10&offset=3"
        );
        bot.stop_polling();
    }

    #[tokio::test]
    async fn dead_task_reports_idle_and_can_be_restarted() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.panic_on_next_get();
        let bot = controller(&transport);

        bot.start_polling().unwrap();
        wait_for(|| bot.state() == PollingState::Idle).await;
        assert_eq!(transport.gets().len(), 1);

        bot.start_polling().unwrap();
        wait_for(|| transport.gets().len() >= 3).await;
        assert_eq!(bot.state(), PollingState::Polling);
        bot.stop_polling();
    }

    #[tokio::test]
    async fn stop_then_start_from_other_threads_leaves_a_consistent_state() {
        let transport = Arc::new(ScriptedTransport::hanging());
        let bot = Arc::new(controller(&transport));

        let workers: Vec<_> = (0..8)
            .map(|i| {
                let bot = Arc::clone(&bot);
                let runtime = Handle::current();
                std::thread::spawn(move || {
                    let _guard = runtime.enter();
                    for _ in 0..50 {
                        if i % 2 == 0 {
                            bot.start_polling().unwrap();
                        } else {
                            bot.stop_polling();
                        }
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        bot.stop_polling();
        assert_eq!(bot.state(), PollingState::Idle);
        bot.start_polling().unwrap();
        assert_eq!(bot.state(), PollingState::Polling);
        bot.stop_polling();
    }
}
