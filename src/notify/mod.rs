//! Due-task notification pipeline.

pub mod dispatcher;
pub mod messages;

pub use dispatcher::{
    Delivery, NotificationDispatcher, PassReport, TaskOutcome, spawn_notification_ticker,
};
