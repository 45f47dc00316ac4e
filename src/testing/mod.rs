//! Testing infrastructure: a scripted chain used by unit and integration tests.

pub mod mock_chain;

pub use mock_chain::{MockChain, MockChainStats};
