pub mod slack;

pub use slack::{Environment, SlackNotifier, SlackReceipt};
