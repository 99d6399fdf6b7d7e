//! The Notification Dispatcher: a single-producer, single-consumer queue
//! with one worker, switching between fire-and-forget and
//! synchronous-before-poweroff delivery based on the [`ShutdownLatch`].

mod dispatcher;
mod sink;

pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use sink::{DiscordWebhookNotifier, HttpNotifier, NotificationSink};
