//! Vidspire engine: backend client, live channel selection and effect execution.
mod backend;
mod engine;
mod persist;
mod push;
mod selector;
mod stream;
mod types;

pub use backend::{
    now_millis, Backend, BackendSettings, ChannelProgressSink, ProgressSink, ReqwestBackend,
};
pub use engine::{EngineConfig, EngineDisconnected, EngineHandle};
pub use persist::{ensure_state_dir, AtomicFileWriter, PersistError};
pub use push::{
    decode_packet, Packet, PushConnector, PushError, PushEvent, PushStream, WsConnector,
    SOCKET_IO_PATH,
};
pub use selector::{run_channel, ChannelRequest, ChannelSettings};
pub use stream::LineBuffer;
pub use types::{ApiError, ApiResponse, EngineEvent, FailureKind, Submission};
