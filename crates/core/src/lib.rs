pub mod client;
pub mod error;
pub mod media;
pub mod protocol;
pub mod session;
pub mod transport;

pub use client::{ClientConfig, RtspClient, RtspUrl};
pub use error::{Result, RtspError};
pub use media::MediaSink;
pub use protocol::Credentials;
pub use session::{ConnectionStatus, SessionState, TransportMode};
