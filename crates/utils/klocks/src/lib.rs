mod kspin;

pub use kspin::{SpinMutex, SpinMutexGuard};
pub use spin::Once;
