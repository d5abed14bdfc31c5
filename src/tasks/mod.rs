//! Task model, queries and owner-checked operations.

pub mod model;
pub mod queries;
pub mod service;

pub use model::{Task, TaskDraft, TaskView};
pub use queries::TaskQueries;
pub use service::{TaskInput, TaskService};
