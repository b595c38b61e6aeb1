pub mod config;
pub mod k8s;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod monitor;
