pub mod query;
pub mod task;
pub mod user;

pub use query::{TaskListParams, TaskPage, TaskQuery};
pub use task::{NewTask, Subtask, Task, TaskFields, TaskInput, TaskPatch, TaskPriority};
pub use user::{User, UserProfile};
