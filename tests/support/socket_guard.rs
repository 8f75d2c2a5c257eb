//! Lets socket-bound tests skip where localhost cannot be bound.
//!
//! Shared by the library's unit tests and the integration tests. Setting
//! `HGET_REQUIRE_SOCKET_TESTS=1` turns a skip into a failure.

use std::net::TcpListener;
use std::panic::Location;

use wiremock::MockServer;

const REQUIRE_ENV: &str = "HGET_REQUIRE_SOCKET_TESTS";

fn sockets_required() -> bool {
    std::env::var(REQUIRE_ENV)
        .is_ok_and(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Returns true when the calling test should return early.
///
/// # Panics
///
/// When localhost cannot be bound and sockets are required.
#[track_caller]
#[must_use]
pub fn skip_without_localhost() -> bool {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return false;
    }

    let caller = Location::caller();
    assert!(
        !sockets_required(),
        "{caller}: localhost is not bindable and {REQUIRE_ENV} is set"
    );
    eprintln!("{caller}: localhost is not bindable, skipping (set {REQUIRE_ENV}=1 to fail instead)");
    true
}

/// Starts a wiremock server, or returns `None` if the test must be skipped.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if skip_without_localhost() {
        return None;
    }
    Some(MockServer::start().await)
}
