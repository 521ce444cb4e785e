//! Core types: the work-from-home event and tracing setup

pub mod event;
pub mod tracing;

pub use event::{DEFAULT_MESSAGE, EVENT_TIME_ZONE, WorkFromHomeEvent, render_summary, resolve_user};
pub use self::tracing::{TracingConfig, TracingError, init_tracing};
