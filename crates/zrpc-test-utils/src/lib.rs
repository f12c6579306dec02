//! zrpc-test-utils: Test helpers for driving sessions without SSH.

pub mod mock_transport;

pub use mock_transport::{MockExec, MockServer, MockTransport, mock_transport};
