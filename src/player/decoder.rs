use crate::core::{CancelToken, MediaFrame, MediaKind, MediaPacket, Result, StreamInfo, SyncPoint};
use crate::player::router::PacketConsumer;
use crate::player::sync::{SyncConfig, SyncGate};
use crossbeam_channel::Sender;
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// 帧解码器抽象接口
///
/// 编解码本体是外部协作者，核心只依赖这个边界：
/// 进包、出帧（pts 已换算为毫秒）。
pub trait FrameDecoder: Send {
    /// 解码一个包，产出 0~n 帧
    fn decode(&mut self, packet: &MediaPacket) -> Result<Vec<MediaFrame>>;

    /// 刷出内部缓冲的帧（停止/关闭时调用）
    fn flush(&mut self) -> Result<Vec<MediaFrame>>;

    /// 释放解码器资源
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// 解码器工厂 - 每个被启用的流惰性创建一个私有解码器
pub trait DecoderFactory: Send + Sync {
    fn create(&self, stream: &StreamInfo) -> Result<Box<dyn FrameDecoder>>;
}

/// 帧输出端 - 通过门限的帧交到这里呈现
pub trait FrameSink: Send + Sync {
    fn present(&self, frame: MediaFrame);
}

/// 基于 crossbeam 通道的内置输出端
pub struct ChannelSink {
    tx: Sender<MediaFrame>,
}

impl ChannelSink {
    pub fn new(tx: Sender<MediaFrame>) -> Self {
        Self { tx }
    }
}

impl FrameSink for ChannelSink {
    fn present(&self, frame: MediaFrame) {
        if self.tx.send(frame).is_err() {
            debug!("帧接收端已关闭，丢弃帧");
        }
    }
}

/// 本次播放会话的同步上下文（worker 启动时装上）
struct SyncState {
    point: SyncPoint,
    cancel: Arc<CancelToken>,
}

impl Clone for SyncState {
    fn clone(&self) -> Self {
        Self {
            point: self.point,
            cancel: Arc::clone(&self.cancel),
        }
    }
}

/// 组合式同步解码消费者：解码 → 同步门限 → 输出端
///
/// 不搞"同步解码器继承普通解码器"那一套：通用解码器产帧，
/// 门限作为独立阶段包在它的输出上，按媒体类型参数化
/// （偏置、丢弃阈值），彻底避免子类化。
///
/// 未装同步基准点时（播放器空闲、`read_any` 驱动），
/// 帧直接透传到输出端。
pub struct SyncedDecoder {
    stream_index: usize,
    kind: MediaKind,
    decoder: Mutex<Box<dyn FrameDecoder>>,
    gate: SyncGate,
    sink: Arc<dyn FrameSink>,
    sync: RwLock<Option<SyncState>>,
}

impl SyncedDecoder {
    pub fn new(
        stream: &StreamInfo,
        decoder: Box<dyn FrameDecoder>,
        config: &SyncConfig,
        sink: Arc<dyn FrameSink>,
    ) -> Self {
        Self {
            stream_index: stream.index,
            kind: stream.kind,
            decoder: Mutex::new(decoder),
            gate: SyncGate::for_kind(config, stream.kind),
            sink,
            sync: RwLock::new(None),
        }
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// 装上本次播放的基准点和取消令牌（worker 启动前调用）
    pub(crate) fn arm(&self, point: SyncPoint, cancel: Arc<CancelToken>) {
        *self.sync.write() = Some(SyncState { point, cancel });
    }

    /// 卸下同步上下文（worker 退出后调用）
    pub(crate) fn disarm(&self) {
        *self.sync.write() = None;
    }

    /// worker 退出时尽力刷出解码器缓冲帧
    ///
    /// flush 错误只记日志，不致命；`present_tail` 为 true 时
    /// （自然到达流结尾）把尾帧送到输出端。
    pub(crate) fn finish(&self, present_tail: bool) {
        match self.decoder.lock().flush() {
            Ok(frames) => {
                if present_tail {
                    for frame in frames {
                        self.sink.present(frame);
                    }
                }
            }
            Err(e) => {
                warn!("⚠️ 流 {} 解码器 flush 失败: {}", self.stream_index, e);
            }
        }
    }

    /// 刷出并释放解码器资源
    pub(crate) fn close_decoder(&self) {
        let mut decoder = self.decoder.lock();
        if decoder.is_closed() {
            return;
        }
        if let Err(e) = decoder.flush() {
            warn!("⚠️ 流 {} 解码器关闭前 flush 失败: {}", self.stream_index, e);
        }
        decoder.close();
        debug!("🔒 流 {} 解码器已关闭", self.stream_index);
    }

    pub fn is_closed(&self) -> bool {
        self.decoder.lock().is_closed()
    }
}

impl PacketConsumer for SyncedDecoder {
    fn process_packet(&self, packet: &MediaPacket) -> Result<()> {
        // 解码持锁，定节拍不持锁 - 门限睡眠绝不阻塞别的路径
        let frames = self.decoder.lock().decode(packet)?;
        if frames.is_empty() {
            return Ok(());
        }

        let sync = self.sync.read().clone();
        for frame in frames {
            match &sync {
                Some(state) => {
                    if self.gate.pace(frame.pts, &state.point, &state.cancel) {
                        self.sink.present(frame);
                    }
                }
                None => self.sink.present(frame),
            }
        }
        Ok(())
    }
}
