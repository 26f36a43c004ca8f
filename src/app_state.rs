use std::sync::Arc;

use crate::config::Config;
use crate::google::GoogleOAuth;
use crate::task_service::TaskService;
use crate::user_service::UserService;

#[derive(Clone)]
pub struct AppState {
    pub tasks: Arc<TaskService>,
    pub users: Arc<UserService>,
    pub config: Config,
    /// `None` when Google sign-in is not configured.
    pub google: Option<Arc<GoogleOAuth>>,
}
