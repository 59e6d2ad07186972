pub mod orchestrator;

pub use orchestrator::{DebouncePhase, DebounceWindow, MotionDebounceOrchestrator, DEFAULT_DEBOUNCE};
