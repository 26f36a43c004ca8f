pub mod dates;
pub mod task;
pub mod user;

pub use task::{NewTaskRecord, Priority, Task, TaskChanges, TaskDraft, TaskPatch, TaskStatus};
pub use user::{AuthPayload, AuthProvider, NewUserRecord, User, UserProfile};
