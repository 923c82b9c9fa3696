mod control;
mod datagram;

pub use control::ControlChannel;
pub use datagram::{DatagramSocket, RECV_BUFFER_SIZE};
