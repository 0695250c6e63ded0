//! Plugin System Tests
//!
//! Lifecycle scenarios driven through the manager with mock plugins.


#[cfg(test)]
pub mod manager_tests;

#[cfg(test)]
pub mod isolation_tests;
