pub mod framing;
pub mod listener;
pub mod outbound;
