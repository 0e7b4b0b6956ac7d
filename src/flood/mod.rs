//! Flood control logic and state management.

mod backend;
mod control;
mod decision;
mod window;

pub use backend::FloodControlBackend;
pub use control::FloodControl;
pub use decision::Decision;
pub use window::CallWindow;
