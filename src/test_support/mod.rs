//! Helpers shared by in-crate tests.

#[path = "../../tests/support/socket_guard.rs"]
pub mod socket_guard;
