//! Client-side sync layer of FlowSphere.
//!
//! This crate owns the session state, the cached task and project hooks that
//! gate every remote call on it, the AI assistant, navigation between views,
//! and the configuration shared by every front end.

pub mod ai;
pub mod backend;
pub mod cache;
pub mod config;
pub mod context;
pub mod dashboard;
pub mod error;
pub mod hook;
pub mod navigation;
pub mod retry;
pub mod session;

// Re-exports for convenience
pub use ai::{AiAction, AiResponse, AiService, LlmProvider, RateLimiter, TextProvider, TimeBlock};
pub use backend::Backend;
pub use cache::{QueryCache, QueryKey};
pub use config::{AppConfig, ConfigReport};
pub use context::AppContext;
pub use dashboard::DashboardSummary;
pub use error::AppError;
pub use hook::{MutationTracker, ProjectHook, ResourceHook, TaskHook};
pub use navigation::{NavigationHandle, NavigationWatch, Navigator, View};
pub use retry::RetryPolicy;
pub use session::{AuthEvent, SessionProvider, SessionWatch};
