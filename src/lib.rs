//! 媒体解复用与同步播放核心库
//!
//! 两个紧耦合的子系统：
//! - 按需包路由（`StreamRouter`）：从单游标容器数据源拉包，
//!   按流分发给消费者，并为乱序的读取请求暂存旁路包；
//! - 播放调度（`MediaPlayer`）：每个启用的流一个 worker 线程，
//!   解码帧经同步门限（`SyncGate`）对齐共享墙钟基准后呈现。
//!
//! 容器解封装、编解码、格式转换都是外部协作者，只以 trait
//! 边界出现（`PacketSource`、`FrameDecoder`、`FrameSink`）。
//! 启用 `ffmpeg` feature 可获得基于 FFmpeg 的数据源实现。

pub mod core;
pub mod player;

pub use crate::core::{
    CancelToken, MediaError, MediaFrame, MediaKind, MediaPacket, PlaybackState, PlayerState,
    Rational, Result, StreamInfo, SyncPoint,
};
pub use crate::player::{
    ChannelSink, DecoderFactory, FrameDecoder, FrameSink, MediaPlayer, PacketConsumer,
    PacketSource, StreamRouter, SyncConfig, SyncGate, SyncedDecoder,
};

#[cfg(feature = "ffmpeg")]
pub use crate::player::FfmpegSource;
