pub mod driver;
pub mod endpointer;
pub mod machine;

pub use driver::{SessionControl, SessionDriver, SessionHandles};
pub use machine::{ActivationSource, SessionMode};
