pub mod api;
pub mod config;
pub mod countdown;
pub mod error;
pub mod model;
pub mod normalize;
pub mod polling;
pub mod reveal;
pub mod scheduler;
pub mod session;
#[cfg(feature = "test-support")]
pub mod testing;
