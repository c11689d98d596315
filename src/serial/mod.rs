//! Serial link to the EPG acquisition device
//!
//! Line-oriented text protocol:
//! - device → host: `INIT`, `BEGIN`, `PARAM[,...]`, `O,<voltage>`
//! - host → device: `BEGIN,<sampleRate>`, `PARAM,1,<ri>,<gain>,<bias>,<freq>,<amp>`

mod handshake;
mod link;
mod ports;
mod protocol;

pub use handshake::{Handshake, HandshakeStep};
pub use link::LineLink;
pub use ports::{list_ports, open_device, open_port, select_device, PortInfo};
pub use protocol::{AcquisitionParams, Command, DeviceMessage};
