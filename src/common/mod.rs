//! Code shared by the binary and the routing core: scenario files.

pub mod scenario;
