use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use crate::led::Led;
use crate::servo::{Servo, CENTER_ANGLE, MAX_ANGLE};
use crate::system::MemoryProbe;
use crate::telegram::api::TelegramClient;
use crate::telegram::controller::BotController;
use crate::telegram::dispatcher::CommandHandler;

/// Escape user-supplied text for HTML parse mode.
fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

const SERVO_USAGE: &str = "Usage: /servo &lt;angle&gt; or /servo &lt;command&gt;\n\
     Examples:\n\
     <code>/servo 90</code>\n\
     <code>/servo sweep</code>\n\
     <code>/servo center</code>";

const LED_USAGE: &str = "Usage: /led on, /led off or /led toggle";

/// Register `/start`, `/help`, `/status`, `/servo`, `/led` and the unknown-command reply.
pub fn register_builtin_commands(
    bot: &BotController,
    servo: Arc<dyn Servo>,
    led: Arc<dyn Led>,
    memory: Arc<dyn MemoryProbe>,
) {
    let client = bot.client();

    bot.register_command(
        "/start",
        Arc::new(StartCommand {
            client: Arc::clone(&client),
        }),
    );
    bot.register_command(
        "/help",
        Arc::new(HelpCommand {
            client: Arc::clone(&client),
        }),
    );
    bot.register_command(
        "/status",
        Arc::new(StatusCommand {
            client: Arc::clone(&client),
            servo: Arc::clone(&servo),
            led: Arc::clone(&led),
            memory,
        }),
    );
    bot.register_command(
        "/servo",
        Arc::new(ServoCommand {
            client: Arc::clone(&client),
            servo,
        }),
    );
    bot.register_command(
        "/led",
        Arc::new(LedCommand {
            client: Arc::clone(&client),
            led,
        }),
    );
    bot.set_default_handler(Arc::new(UnknownCommand { client }));
}

struct StartCommand {
    client: Arc<TelegramClient>,
}

#[async_trait]
impl CommandHandler for StartCommand {
    async fn invoke(&self, chat_id: &str, _text: &str, sender_name: &str) {
        let welcome = format!(
            "Hello, {}!\n\n\
             I am a bot controlling a servo.\n\n\
             Available commands:\n\
             • /help - command reference\n\
             • /status - system status\n\
             • /servo &lt;angle&gt; - set the servo angle (0-180)\n\
             • /servo sweep - sweep the servo\n\
             • /servo center - center the servo\n\
             • /led on|off|toggle - switch the LED",
            escape_html(sender_name)
        );
        self.client.send_message(chat_id, &welcome).await;
    }
}

struct HelpCommand {
    client: Arc<TelegramClient>,
}

#[async_trait]
impl CommandHandler for HelpCommand {
    async fn invoke(&self, chat_id: &str, _text: &str, _sender_name: &str) {
        let help = "Command reference:\n\n\
                    Servo control:\n\
                    <code>/servo 90</code> - set the angle to 90°\n\
                    <code>/servo sweep</code> - sweep back and forth\n\
                    <code>/servo center</code> - center the servo\n\n\
                    LED:\n\
                    <code>/led on</code>, <code>/led off</code>, <code>/led toggle</code>\n\n\
                    System:\n\
                    <code>/status</code> - memory, servo and LED status\n\
                    <code>/help</code> - this reference";
        self.client.send_message(chat_id, help).await;
    }
}

struct StatusCommand {
    client: Arc<TelegramClient>,
    servo: Arc<dyn Servo>,
    led: Arc<dyn Led>,
    memory: Arc<dyn MemoryProbe>,
}

fn led_label(led: &dyn Led) -> &'static str {
    if led.is_on() {
        "ON"
    } else {
        "OFF"
    }
}

#[async_trait]
impl CommandHandler for StatusCommand {
    async fn invoke(&self, chat_id: &str, _text: &str, _sender_name: &str) {
        let servo = match self.servo.angle() {
            Some(angle) => format!("{}°", angle),
            None => "not set".to_string(),
        };
        let status = format!(
            "System status:\n\n\
             Memory:\n\
             • Free: {} bytes\n\
             • Minimum: {} bytes\n\n\
             Servo:\n\
             • Angle: {}\n\n\
             LED: {}",
            self.memory.free_bytes(),
            self.memory.min_free_bytes(),
            servo,
            led_label(self.led.as_ref())
        );
        self.client.send_message(chat_id, &status).await;
    }
}

/// What a `/servo` message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServoRequest {
    Sweep,
    Center,
    Angle(u8),
    Usage,
    OutOfRange(i64),
    Invalid(String),
}

/// Parses the argument after the first space of a `/servo` message.
pub fn parse_servo_request(text: &str) -> ServoRequest {
    let Some((_, param)) = text.split_once(' ') else {
        return ServoRequest::Usage;
    };

    match param.trim() {
        "" => ServoRequest::Usage,
        "sweep" => ServoRequest::Sweep,
        "center" => ServoRequest::Center,
        param => match param.parse::<i64>() {
            Ok(angle) => match u8::try_from(angle) {
                Ok(angle) if angle <= MAX_ANGLE => ServoRequest::Angle(angle),
                _ => ServoRequest::OutOfRange(angle),
            },
            Err(_) => ServoRequest::Invalid(param.to_string()),
        },
    }
}

struct ServoCommand {
    client: Arc<TelegramClient>,
    servo: Arc<dyn Servo>,
}

impl ServoCommand {
    async fn execute(&self, request: ServoRequest) -> String {
        let outcome = match request {
            ServoRequest::Usage => return SERVO_USAGE.to_string(),
            ServoRequest::OutOfRange(angle) => {
                return format!("Angle must be between 0 and {} degrees, got {}", MAX_ANGLE, angle)
            }
            ServoRequest::Invalid(param) => {
                return format!("Invalid parameter: {}\n\n{}", escape_html(&param), SERVO_USAGE)
            }
            ServoRequest::Sweep => self
                .servo
                .sweep()
                .await
                .map(|_| "Servo sweep done".to_string()),
            ServoRequest::Center => self
                .servo
                .center()
                .await
                .map(|_| format!("Servo centered ({}°)", CENTER_ANGLE)),
            ServoRequest::Angle(angle) => self
                .servo
                .set_angle(angle)
                .await
                .map(|_| format!("Servo set to {}°", angle)),
        };

        outcome.unwrap_or_else(|e| {
            error!("Servo command failed: {:#}", e);
            format!("Servo error: {}", escape_html(&format!("{:#}", e)))
        })
    }
}

#[async_trait]
impl CommandHandler for ServoCommand {
    async fn invoke(&self, chat_id: &str, text: &str, _sender_name: &str) {
        let response = self.execute(parse_servo_request(text)).await;
        self.client.send_message(chat_id, &response).await;
    }
}

struct LedCommand {
    client: Arc<TelegramClient>,
    led: Arc<dyn Led>,
}

impl LedCommand {
    fn execute(&self, text: &str) -> String {
        let param = text.split_once(' ').map(|(_, param)| param.trim());
        let outcome = match param {
            Some("on") => self.led.set(true),
            Some("off") => self.led.set(false),
            Some("toggle") => self.led.toggle(),
            None | Some("") => {
                return format!("LED is {}\n{}", led_label(self.led.as_ref()), LED_USAGE)
            }
            Some(other) => {
                return format!("Invalid parameter: {}\n{}", escape_html(other), LED_USAGE)
            }
        };

        match outcome {
            Ok(()) => format!("LED is {}", led_label(self.led.as_ref())),
            Err(e) => {
                error!("LED command failed: {:#}", e);
                format!("LED error: {}", escape_html(&format!("{:#}", e)))
            }
        }
    }
}

#[async_trait]
impl CommandHandler for LedCommand {
    async fn invoke(&self, chat_id: &str, text: &str, _sender_name: &str) {
        let response = self.execute(text);
        self.client.send_message(chat_id, &response).await;
    }
}

struct UnknownCommand {
    client: Arc<TelegramClient>,
}

#[async_trait]
impl CommandHandler for UnknownCommand {
    async fn invoke(&self, chat_id: &str, text: &str, _sender_name: &str) {
        let response = format!(
            "Unknown command: {}\nUse /help to get the command list",
            escape_html(text)
        );
        self.client.send_message(chat_id, &response).await;
    }
}
