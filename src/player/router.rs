use crate::core::{MediaError, MediaPacket, Result, StreamInfo};
use crate::player::read_ahead::ReadAheadBuffer;
use crate::player::source::PacketSource;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// 每个流的包缓冲区容量 - 超出即调用方错误，不静默丢弃
pub const STREAM_BUFFER_CAPACITY: usize = 20;

/// 包消费者 - 注册到某个流上接收包的任何对象（通常是解码器）
///
/// 路由层只把它当作不透明的接收端，分发时借出 `&MediaPacket`，
/// 包的释放（Drop）由路由层在分发结束后完成。
pub trait PacketConsumer: Send + Sync {
    fn process_packet(&self, packet: &MediaPacket) -> Result<()>;
}

/// 单个流的路由状态：缓冲开关 + 有界 FIFO + 消费者集合
struct StreamSlot {
    buffering: bool,
    queue: VecDeque<MediaPacket>,
    consumers: Vec<Arc<dyn PacketConsumer>>,
}

impl StreamSlot {
    fn new() -> Self {
        Self {
            buffering: false,
            queue: VecDeque::new(),
            consumers: Vec::new(),
        }
    }
}

struct RouterInner {
    read_ahead: ReadAheadBuffer,
    /// 流索引 -> 路由状态。单一映射，不维护平行数组
    slots: HashMap<usize, StreamSlot>,
}

impl RouterInner {
    /// 为指定流取得一个包：优先消费该流的 FIFO，否则从预读缓冲拉取。
    ///
    /// 单游标数据源意味着满足一个流的请求会顺带读出其他流的包：
    /// 属于已开启缓冲的流就入队，否则直接释放（没人在读，包是可弃的）。
    fn obtain_for(&mut self, stream_index: usize) -> Result<Option<MediaPacket>> {
        if let Some(slot) = self.slots.get_mut(&stream_index) {
            if let Some(packet) = slot.queue.pop_front() {
                return Ok(Some(packet));
            }
        }

        loop {
            match self.read_ahead.next()? {
                None => return Ok(None),
                Some(packet) if packet.stream_index == stream_index => {
                    return Ok(Some(packet));
                }
                Some(packet) => self.stash(packet)?,
            }
        }
    }

    /// 把别的流的包暂存进它的 FIFO，或者直接释放
    fn stash(&mut self, packet: MediaPacket) -> Result<()> {
        let index = packet.stream_index;
        match self.slots.get_mut(&index) {
            Some(slot) if slot.buffering => {
                if slot.queue.len() >= STREAM_BUFFER_CAPACITY {
                    return Err(MediaError::BufferFull {
                        stream_index: index,
                        capacity: STREAM_BUFFER_CAPACITY,
                    });
                }
                slot.queue.push_back(packet);
                Ok(())
            }
            _ => {
                // 未开启缓冲的流：包在这里就地释放
                drop(packet);
                Ok(())
            }
        }
    }
}

/// 包路由器 - 把单游标容器数据源分发为按流的包序列
///
/// 持有每个流的包队列、缓冲开关和消费者集合，提供"推送一切"
/// (`read_any`) 和"按需拉取" (`read_for`) 两种读取模式。
///
/// 并发模型：一把粗锁保护全部路由状态和不可共享的数据源游标；
/// 向消费者分发在锁外对快照进行，锁绝不跨解码或同步睡眠持有。
pub struct StreamRouter {
    inner: Mutex<RouterInner>,
    /// 打开时探测，之后不可变
    streams: Vec<StreamInfo>,
    duration_ms: i64,
    seekable: bool,
    /// 权威"当前位置"（毫秒），由每次成功分发的 dts 推进
    position_ms: AtomicI64,
}

impl StreamRouter {
    pub fn new(source: Box<dyn PacketSource>) -> Self {
        let streams: Vec<StreamInfo> = (0..source.stream_count())
            .filter_map(|i| source.stream(i).cloned())
            .collect();
        let duration_ms = source.duration_ms();
        let seekable = source.is_seekable();

        info!(
            "🎬 打开数据源: {} （{} 个流，时长 {} ms）",
            source.description(),
            streams.len(),
            duration_ms
        );

        let slots = streams
            .iter()
            .map(|s| (s.index, StreamSlot::new()))
            .collect();

        Self {
            inner: Mutex::new(RouterInner {
                read_ahead: ReadAheadBuffer::new(source),
                slots,
            }),
            streams,
            duration_ms,
            seekable,
            position_ms: AtomicI64::new(0),
        }
    }

    // ==================== 读取原语 ====================

    /// 拉取一个包并分发给它所属流的全部消费者
    ///
    /// 返回 false 仅表示真正到达流结尾。
    pub fn read_any(&self) -> Result<bool> {
        let (packet, consumers) = {
            let mut inner = self.inner.lock();
            match inner.read_ahead.next()? {
                None => return Ok(false),
                Some(packet) => {
                    let consumers = inner
                        .slots
                        .get(&packet.stream_index)
                        .map(|slot| slot.consumers.clone())
                        .unwrap_or_default();
                    (packet, consumers)
                }
            }
        };

        self.update_position(&packet);
        for consumer in &consumers {
            consumer.process_packet(&packet)?;
        }
        Ok(true)
    }

    /// 按需读取：为指定流取得并分发一个包
    ///
    /// 播放 worker 的核心原语。调用即幂等地开启该流的缓冲 -
    /// 共享游标下满足本流请求会读出别的流的包，必须能暂存不丢。
    /// 返回 false 仅表示真正到达流结尾。
    pub fn read_for(&self, stream_index: usize) -> Result<bool> {
        let (packet, consumers) = {
            let mut inner = self.inner.lock();
            let slot = inner
                .slots
                .get_mut(&stream_index)
                .ok_or(MediaError::UnknownStream(stream_index))?;
            slot.buffering = true;

            match inner.obtain_for(stream_index)? {
                None => return Ok(false),
                Some(packet) => {
                    let consumers = inner
                        .slots
                        .get(&stream_index)
                        .map(|slot| slot.consumers.clone())
                        .unwrap_or_default();
                    (packet, consumers)
                }
            }
        };

        self.update_position(&packet);
        for consumer in &consumers {
            consumer.process_packet(&packet)?;
        }
        Ok(true)
    }

    /// 由包的 dts 推进共享位置（毫秒）
    ///
    /// 只接受已知且非负的时间戳；畸形时间戳容忍但不推进位置。
    fn update_position(&self, packet: &MediaPacket) {
        let Some(dts) = packet.dts else { return };
        if dts < 0 {
            return;
        }
        if let Some(stream) = self.stream(packet.stream_index) {
            self.position_ms
                .store(stream.time_base.ticks_to_ms(dts), Ordering::Release);
        }
    }

    // ==================== 消费者注册 ====================

    pub fn add_consumer(&self, stream_index: usize, consumer: Arc<dyn PacketConsumer>) -> Result<()> {
        let mut inner = self.inner.lock();
        let slot = inner
            .slots
            .get_mut(&stream_index)
            .ok_or(MediaError::UnknownStream(stream_index))?;
        slot.consumers.push(consumer);
        Ok(())
    }

    pub fn remove_consumer(&self, stream_index: usize, consumer: &Arc<dyn PacketConsumer>) {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.slots.get_mut(&stream_index) {
            slot.consumers.retain(|c| !Arc::ptr_eq(c, consumer));
        }
    }

    pub fn contains_consumer(&self, stream_index: usize, consumer: &Arc<dyn PacketConsumer>) -> bool {
        let inner = self.inner.lock();
        inner
            .slots
            .get(&stream_index)
            .map(|slot| slot.consumers.iter().any(|c| Arc::ptr_eq(c, consumer)))
            .unwrap_or(false)
    }

    // ==================== 缓冲控制 ====================

    /// 切换某个流的缓冲开关；关闭时立即清空（释放）它的 FIFO
    pub fn set_buffering(&self, stream_index: usize, enabled: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        let slot = inner
            .slots
            .get_mut(&stream_index)
            .ok_or(MediaError::UnknownStream(stream_index))?;
        if !enabled {
            let drained = slot.queue.len();
            slot.queue.clear();
            if drained > 0 {
                debug!("🧹 关闭流 {} 缓冲，清空 {} 个包", stream_index, drained);
            }
        }
        slot.buffering = enabled;
        Ok(())
    }

    /// 丢弃所有预读/按流缓冲 - 直播重新起播时旧数据已失效
    pub fn drop_buffers(&self) {
        let mut inner = self.inner.lock();
        inner.read_ahead.drop_buffer();
        for slot in inner.slots.values_mut() {
            slot.queue.clear();
        }
    }

    /// 预热管线：把预读队列填到容量上限
    pub fn prefetch(&self) -> Result<usize> {
        self.inner.lock().read_ahead.prefetch()
    }

    // ==================== Seek ====================

    /// Seek 到目标位置（毫秒）
    ///
    /// 不可 seek 的数据源上是 no-op。成功后所有缓冲被丢弃、
    /// EOF 缓存被清除，位置立即读作目标值。
    pub fn seek(&self, target_ms: i64) -> Result<()> {
        if !self.seekable {
            warn!("⚠️ 数据源不支持 seek，忽略 seek({})", target_ms);
            return Ok(());
        }

        let mut inner = self.inner.lock();
        // 向后优先的 seek 窗口：落在目标之前最近的可定位点
        inner.read_ahead.source_mut().seek(0, target_ms, target_ms)?;
        inner.read_ahead.drop_buffer();
        inner.read_ahead.reset_eof();
        for slot in inner.slots.values_mut() {
            slot.queue.clear();
        }
        self.position_ms.store(target_ms, Ordering::Release);

        info!("🎯 Seek 到 {} ms，缓冲已清空", target_ms);
        Ok(())
    }

    // ==================== 查询 ====================

    /// 当前位置（毫秒）- 全局权威值，不是按流的
    pub fn position(&self) -> i64 {
        self.position_ms.load(Ordering::Acquire)
    }

    pub fn duration_ms(&self) -> i64 {
        self.duration_ms
    }

    pub fn is_seekable(&self) -> bool {
        self.seekable
    }

    /// 直播源：不可 seek 或没有已知时长
    pub fn is_live(&self) -> bool {
        !self.seekable || self.duration_ms <= 0
    }

    pub fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    pub fn stream(&self, index: usize) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.index == index)
    }

    /// 某个流 FIFO 中暂存的包数
    pub fn buffered_len(&self, stream_index: usize) -> usize {
        let inner = self.inner.lock();
        inner
            .slots
            .get(&stream_index)
            .map(|slot| slot.queue.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MediaKind, Rational};

    /// 两路交错的脚本数据源：视频流 0 与音频流 1
    struct InterleavedSource {
        streams: Vec<StreamInfo>,
        packets: VecDeque<MediaPacket>,
    }

    fn packet(stream_index: usize, kind: MediaKind, ts: i64) -> MediaPacket {
        MediaPacket {
            stream_index,
            kind,
            pts: Some(ts),
            dts: Some(ts),
            data: vec![0u8; 4],
        }
    }

    impl InterleavedSource {
        /// v0 a0 v1 a1 ... 的交错序列，时间戳按 40ms 递增
        fn new(pairs: usize) -> Self {
            let mut packets = VecDeque::new();
            for i in 0..pairs {
                let ts = i as i64 * 40;
                packets.push_back(packet(0, MediaKind::Video, ts));
                packets.push_back(packet(1, MediaKind::Audio, ts));
            }
            Self {
                streams: vec![
                    StreamInfo {
                        index: 0,
                        kind: MediaKind::Video,
                        time_base: Rational::MILLIS,
                        duration: 10_000,
                    },
                    StreamInfo {
                        index: 1,
                        kind: MediaKind::Audio,
                        time_base: Rational::MILLIS,
                        duration: 10_000,
                    },
                ],
                packets,
            }
        }
    }

    impl PacketSource for InterleavedSource {
        fn read_packet(&mut self) -> Result<Option<MediaPacket>> {
            Ok(self.packets.pop_front())
        }

        fn seek(&mut self, _min: i64, _target: i64, _max: i64) -> Result<()> {
            Ok(())
        }

        fn duration_ms(&self) -> i64 {
            10_000
        }

        fn stream_count(&self) -> usize {
            self.streams.len()
        }

        fn stream(&self, index: usize) -> Option<&StreamInfo> {
            self.streams.get(index)
        }

        fn description(&self) -> String {
            "interleaved".to_string()
        }
    }

    /// 记录收到的 (流索引, pts) 的消费者
    struct Recorder {
        seen: Mutex<Vec<(usize, i64)>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<(usize, i64)> {
            self.seen.lock().clone()
        }
    }

    impl PacketConsumer for Recorder {
        fn process_packet(&self, packet: &MediaPacket) -> Result<()> {
            self.seen
                .lock()
                .push((packet.stream_index, packet.pts.unwrap_or(-1)));
            Ok(())
        }
    }

    #[test]
    fn test_read_for_routes_only_own_stream() {
        let router = StreamRouter::new(Box::new(InterleavedSource::new(5)));
        let video = Recorder::new();
        let audio = Recorder::new();
        router.add_consumer(0, video.clone()).unwrap();
        router.add_consumer(1, audio.clone()).unwrap();
        router.set_buffering(1, true).unwrap();

        // 只拉视频：音频包作为副作用被暂存，绝不进视频消费者
        for _ in 0..5 {
            assert!(router.read_for(0).unwrap());
        }
        assert!(!router.read_for(0).unwrap());

        let video_seen = video.seen();
        assert_eq!(video_seen.len(), 5);
        assert!(video_seen.iter().all(|(idx, _)| *idx == 0));
        assert!(audio.seen().is_empty());
        assert_eq!(router.buffered_len(1), 5);

        // 随后拉音频：暂存的包按顺序供出，一个不丢
        for _ in 0..5 {
            assert!(router.read_for(1).unwrap());
        }
        let audio_seen = audio.seen();
        assert_eq!(audio_seen.len(), 5);
        assert_eq!(
            audio_seen,
            vec![(1, 0), (1, 40), (1, 80), (1, 120), (1, 160)]
        );
    }

    #[test]
    fn test_unbuffered_side_packets_are_discarded() {
        let router = StreamRouter::new(Box::new(InterleavedSource::new(3)));
        // 不开启流 1 的缓冲（read_for(0) 只会自动开启流 0 的）
        for _ in 0..3 {
            assert!(router.read_for(0).unwrap());
        }
        assert_eq!(router.buffered_len(1), 0);
    }

    #[test]
    fn test_read_any_dispatches_in_container_order() {
        let router = StreamRouter::new(Box::new(InterleavedSource::new(2)));
        let video = Recorder::new();
        let audio = Recorder::new();
        router.add_consumer(0, video.clone()).unwrap();
        router.add_consumer(1, audio.clone()).unwrap();

        while router.read_any().unwrap() {}

        assert_eq!(video.seen(), vec![(0, 0), (0, 40)]);
        assert_eq!(audio.seen(), vec![(1, 0), (1, 40)]);
    }

    #[test]
    fn test_buffering_toggle_drains_queue() {
        let router = StreamRouter::new(Box::new(InterleavedSource::new(4)));
        router.set_buffering(1, true).unwrap();
        for _ in 0..4 {
            router.read_for(0).unwrap();
        }
        assert_eq!(router.buffered_len(1), 4);

        router.set_buffering(1, false).unwrap();
        assert_eq!(router.buffered_len(1), 0);
    }

    #[test]
    fn test_buffer_overflow_is_an_error() {
        // 容量 + 1 对包，全部通过 read_for(0) 读出
        let router = StreamRouter::new(Box::new(InterleavedSource::new(
            STREAM_BUFFER_CAPACITY + 1,
        )));
        router.set_buffering(1, true).unwrap();

        let mut last = Ok(true);
        for _ in 0..STREAM_BUFFER_CAPACITY + 2 {
            last = router.read_for(0);
            if last.is_err() {
                break;
            }
        }
        assert!(matches!(
            last,
            Err(MediaError::BufferFull { stream_index: 1, .. })
        ));
    }

    #[test]
    fn test_position_follows_dts() {
        let router = StreamRouter::new(Box::new(InterleavedSource::new(3)));
        assert_eq!(router.position(), 0);
        router.read_for(0).unwrap();
        assert_eq!(router.position(), 0);
        router.read_for(0).unwrap();
        assert_eq!(router.position(), 40);
    }

    #[test]
    fn test_negative_dts_does_not_move_position() {
        struct OneBadPacket {
            streams: Vec<StreamInfo>,
            sent: bool,
        }
        impl PacketSource for OneBadPacket {
            fn read_packet(&mut self) -> Result<Option<MediaPacket>> {
                if self.sent {
                    return Ok(None);
                }
                self.sent = true;
                Ok(Some(MediaPacket {
                    stream_index: 0,
                    kind: MediaKind::Video,
                    pts: None,
                    dts: Some(-9),
                    data: Vec::new(),
                }))
            }
            fn seek(&mut self, _: i64, _: i64, _: i64) -> Result<()> {
                Ok(())
            }
            fn duration_ms(&self) -> i64 {
                0
            }
            fn stream_count(&self) -> usize {
                1
            }
            fn stream(&self, index: usize) -> Option<&StreamInfo> {
                self.streams.get(index)
            }
            fn description(&self) -> String {
                "bad-dts".to_string()
            }
        }

        let router = StreamRouter::new(Box::new(OneBadPacket {
            streams: vec![StreamInfo {
                index: 0,
                kind: MediaKind::Video,
                time_base: Rational::MILLIS,
                duration: 0,
            }],
            sent: false,
        }));
        assert!(router.read_for(0).unwrap());
        assert_eq!(router.position(), 0);
    }

    #[test]
    fn test_seek_resets_position_and_buffers() {
        let router = StreamRouter::new(Box::new(InterleavedSource::new(6)));
        router.set_buffering(1, true).unwrap();
        for _ in 0..3 {
            router.read_for(0).unwrap();
        }
        assert_eq!(router.buffered_len(1), 3);

        router.seek(5000).unwrap();
        // 位置在处理任何后续包之前就读作 5000，缓冲全空
        assert_eq!(router.position(), 5000);
        assert_eq!(router.buffered_len(0), 0);
        assert_eq!(router.buffered_len(1), 0);
    }

    #[test]
    fn test_consumer_registration() {
        let router = StreamRouter::new(Box::new(InterleavedSource::new(1)));
        let consumer = Recorder::new();
        let handle: Arc<dyn PacketConsumer> = consumer;

        assert!(!router.contains_consumer(0, &handle));
        router.add_consumer(0, handle.clone()).unwrap();
        assert!(router.contains_consumer(0, &handle));
        router.remove_consumer(0, &handle);
        assert!(!router.contains_consumer(0, &handle));

        assert!(matches!(
            router.add_consumer(99, handle.clone()),
            Err(MediaError::UnknownStream(99))
        ));
    }
}
