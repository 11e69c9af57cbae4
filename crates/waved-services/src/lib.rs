//! waved-services: Playback transport, audio devices, file codecs and the editing session

pub mod audio_io;
pub mod codec;
pub mod session;
pub mod transport;

pub use audio_io::{
    AudioOutputError, CpalBackend, HostInfo, OutputBackend, OutputDevice, OutputStream, RenderFn,
    StreamSpec, list_hosts, list_output_devices,
};
pub use codec::{CodecError, DecodedAudio, decode, encode, load_into};
pub use session::{Session, SessionConfig, SessionError};
pub use transport::{DEFAULT_BLOCK_SIZE, PlaybackTransport, TransportEvent, TransportState};
