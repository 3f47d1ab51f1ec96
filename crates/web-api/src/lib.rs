//! Web API 层。
//!
//! 提供 Axum 路由：控制面请求统一信封、Bearer 凭证校验，以及实时连接的升级与收发。

mod auth;
mod error;
mod extract;
mod response;
mod routes;
mod state;
mod ws_connection;

pub use auth::{extract_bearer, AuthUser};
pub use error::ApiError;
pub use response::ApiResponse;
pub use routes::router;
pub use state::AppState;
