//! Hook System
//!
//! Named extension points invoked at lifecycle and request stages.

pub mod system;
pub mod types;

pub use system::{HookInfo, HookSystem, PluginHooks};
pub use types::{DispatchReport, HandlerReport, HookContext, HookHandler, HookId, HookOutcome, HookStats, HookType};
