mod middleware;
mod rate_limit;
pub mod session;

pub use middleware::{DashboardContext, RequestContext, require_dashboard_token, require_user};
pub use rate_limit::{FAILED_LOGIN_WINDOW, LoginLimiter, MAX_FAILED_LOGINS};
pub use session::{Flash, SessionUser};
