pub mod replay;
pub mod roundtrip;

pub use replay::{replay, ReplayArgs};
pub use roundtrip::{roundtrip, RoundtripArgs};
