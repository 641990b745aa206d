//! Wire contract consumed by the external transport layer

pub mod protocol;
