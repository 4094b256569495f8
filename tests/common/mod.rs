pub mod harness;

// Re-export commonly used test utilities
pub use harness::{FakeAgent, FakeMaterials, TestHarness};
