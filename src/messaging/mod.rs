// Messaging - commands to the audio thread and diagnostics back to the host

pub mod channels;
pub mod command;
pub mod notification;

pub use channels::{SinkCommandConsumer, SinkCommandProducer, create_sink_channel};
pub use command::SinkCommand;
pub use notification::{Notification, NotificationCategory, NotificationLevel};
