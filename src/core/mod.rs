pub mod dispatch;
pub mod frame;
pub mod headers;
pub mod peer;
pub mod recorder;
pub mod registry;
pub mod replay;

pub use dispatch::{DispatchError, DispatchRequest, Dispatcher};
pub use frame::{ControlFrame, FrameHeaders, ResponseMode};
pub use peer::Peer;
pub use recorder::Recorder;
pub use registry::PeerRegistry;
pub use replay::{ReplayEngine, ReplayError, ReplaySummary};
