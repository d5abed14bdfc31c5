//! Task reminder: personal tasks with due dates, reminded over chat or email.

pub mod channels;
pub mod chat;
pub mod config;
pub mod error;
pub mod identity;
pub mod notify;
pub mod settings;
pub mod store;
pub mod tasks;
pub mod timezone;
pub mod web;
