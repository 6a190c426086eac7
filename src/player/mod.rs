// 播放器核心模块

pub mod decoder;
pub mod read_ahead;
pub mod router;
pub mod scheduler;
pub mod source;
pub mod sync;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg_source;

pub use decoder::{ChannelSink, DecoderFactory, FrameDecoder, FrameSink, SyncedDecoder};
pub use read_ahead::{ReadAheadBuffer, READ_AHEAD_CAPACITY};
pub use router::{PacketConsumer, StreamRouter, STREAM_BUFFER_CAPACITY};
pub use scheduler::MediaPlayer;
pub use source::PacketSource;
pub use sync::{GateDecision, SyncConfig, SyncGate, SyncPolicy};

#[cfg(feature = "ffmpeg")]
pub use ffmpeg_source::FfmpegSource;
