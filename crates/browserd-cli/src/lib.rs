//! browserd binary internals, exposed as a library for integration tests.

pub mod serve;
