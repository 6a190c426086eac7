use crate::core::{
    CancelToken, MediaError, PlaybackState, PlayerState, Result, SyncPoint,
};
use crate::player::decoder::{DecoderFactory, FrameSink, SyncedDecoder};
use crate::player::router::{PacketConsumer, StreamRouter};
use crate::player::source::PacketSource;
use crate::player::sync::SyncConfig;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::process;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

/// 单个流的播放 worker：取消令牌 + 线程句柄
struct StreamWorker {
    cancel: Arc<CancelToken>,
    handle: Option<JoinHandle<()>>,
}

struct PlayerInner {
    /// 本次播放的基准点；Some = Playing，None = Idle
    epoch: Option<SyncPoint>,
    /// 停止时累计的逻辑位置（毫秒），下次 play 从这里续拍
    stop_position: i64,
    /// 打开播放器的墙钟时刻（直播基准推导用）
    opened_at: Instant,
    /// 流索引 -> 已启用的同步解码消费者
    enabled: HashMap<usize, Arc<SyncedDecoder>>,
    /// 流索引 -> 运行中的 worker（每个流至多一个）
    workers: HashMap<usize, StreamWorker>,
}

/// 播放调度器 - 每个启用的流一个 worker 线程
///
/// 状态机：Idle（无 worker）→ Playing（≥1 worker）→ Idle。
/// play/stop/seek/enable/disable 全部在同一把粗锁下完成，
/// worker 启动时捕获基准点副本，稳态播放不碰调度器锁。
pub struct MediaPlayer {
    router: Arc<StreamRouter>,
    factory: Box<dyn DecoderFactory>,
    sink: Arc<dyn FrameSink>,
    config: SyncConfig,
    inner: Mutex<PlayerInner>,
}

impl MediaPlayer {
    pub fn new(
        source: Box<dyn PacketSource>,
        factory: Box<dyn DecoderFactory>,
        sink: Arc<dyn FrameSink>,
    ) -> Self {
        Self::with_config(source, factory, sink, SyncConfig::default())
    }

    pub fn with_config(
        source: Box<dyn PacketSource>,
        factory: Box<dyn DecoderFactory>,
        sink: Arc<dyn FrameSink>,
        config: SyncConfig,
    ) -> Self {
        Self {
            router: Arc::new(StreamRouter::new(source)),
            factory,
            sink,
            config,
            inner: Mutex::new(PlayerInner {
                epoch: None,
                stop_position: 0,
                opened_at: Instant::now(),
                enabled: HashMap::new(),
                workers: HashMap::new(),
            }),
        }
    }

    // ==================== 流启用/禁用 ====================

    /// 启用一个流：惰性创建解码器并注册为消费者
    ///
    /// 重复启用是 no-op（不会出现第二个解码器或 worker）。
    /// 播放中启用会立即用当前基准点为它启动 worker。
    pub fn enable_stream(&self, stream_index: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.enabled.contains_key(&stream_index) {
            debug!("流 {} 已启用，忽略", stream_index);
            return Ok(());
        }

        let stream = self
            .router
            .stream(stream_index)
            .ok_or(MediaError::UnknownStream(stream_index))?
            .clone();
        let decoder = self.factory.create(&stream)?;
        let synced = Arc::new(SyncedDecoder::new(
            &stream,
            decoder,
            &self.config,
            Arc::clone(&self.sink),
        ));

        self.router.add_consumer(stream_index, synced.clone())?;
        self.router.set_buffering(stream_index, true)?;
        inner.enabled.insert(stream_index, Arc::clone(&synced));
        info!("{} ✅ 启用流 {} ({:?})", log_ctx(), stream_index, stream.kind);

        if let Some(epoch) = inner.epoch {
            self.spawn_worker(&mut inner.workers, synced, epoch);
        }
        Ok(())
    }

    /// 禁用一个流：注销消费者、关缓冲、停掉并等待它的 worker
    ///
    /// 只影响这一个流，其余 worker 继续播放。
    pub fn disable_stream(&self, stream_index: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        let Some(synced) = inner.enabled.remove(&stream_index) else {
            return Ok(());
        };

        let handle: Arc<dyn PacketConsumer> = synced.clone();
        self.router.remove_consumer(stream_index, &handle);
        self.router.set_buffering(stream_index, false)?;

        if let Some(mut worker) = inner.workers.remove(&stream_index) {
            worker.cancel.cancel();
            if let Some(handle) = worker.handle.take() {
                if handle.join().is_err() {
                    warn!("{} ⚠️ 流 {} 播放线程异常退出", log_ctx(), stream_index);
                }
            }
        }

        synced.close_decoder();
        info!("{} 🚫 禁用流 {}", log_ctx(), stream_index);
        Ok(())
    }

    pub fn is_stream_enabled(&self, stream_index: usize) -> bool {
        self.inner.lock().enabled.contains_key(&stream_index)
    }

    // ==================== 播放控制 ====================

    /// 开始播放。已在播放则 no-op。
    ///
    /// 直播源：基准从当前墙钟减去固定余量重新推导，且先丢弃
    /// 全部预读/按流缓冲 - 缓冲里的数据已经过期。
    pub fn play(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        self.play_locked(&mut inner)
    }

    fn play_locked(&self, inner: &mut PlayerInner) -> Result<()> {
        if inner.epoch.is_some() {
            debug!("已在播放，忽略 play()");
            return Ok(());
        }

        if self.router.is_live() {
            let elapsed = inner.opened_at.elapsed().as_millis() as i64;
            inner.stop_position = (elapsed - self.config.live_delay_ms).max(0);
            self.router.drop_buffers();
            info!(
                "{} 📡 直播源：基准回退到 {} ms，缓冲已作废",
                log_ctx(),
                inner.stop_position
            );
        }

        let epoch = SyncPoint::starting_at(inner.stop_position);
        inner.epoch = Some(epoch);

        // 先装好全部基准点，再一起启动 worker
        let consumers: Vec<Arc<SyncedDecoder>> = inner.enabled.values().cloned().collect();
        for consumer in consumers {
            self.spawn_worker(&mut inner.workers, consumer, epoch);
        }

        info!(
            "{} 🎬 开始播放（起点 {} ms，{} 个流）",
            log_ctx(),
            epoch.offset_ms,
            inner.workers.len()
        );
        Ok(())
    }

    fn spawn_worker(
        &self,
        workers: &mut HashMap<usize, StreamWorker>,
        consumer: Arc<SyncedDecoder>,
        epoch: SyncPoint,
    ) {
        let stream_index = consumer.stream_index();
        if workers.contains_key(&stream_index) {
            // 每个流至多一个 worker
            return;
        }

        let cancel = Arc::new(CancelToken::new());
        consumer.arm(epoch, Arc::clone(&cancel));

        let router = Arc::clone(&self.router);
        let worker_cancel = Arc::clone(&cancel);
        let handle = thread::spawn(move || {
            info!("{} ▶️ 流 {} 播放线程启动", log_ctx(), stream_index);
            let mut reached_eof = false;
            while !worker_cancel.is_cancelled() {
                match router.read_for(stream_index) {
                    Ok(true) => {}
                    Ok(false) => {
                        info!("{} 📄 流 {} 到达结尾", log_ctx(), stream_index);
                        reached_eof = true;
                        break;
                    }
                    Err(e) => {
                        // 本流按已结束处理，其余流不受影响
                        error!("{} ❌ 流 {} 读取/解码失败: {}", log_ctx(), stream_index, e);
                        break;
                    }
                }
            }
            consumer.finish(reached_eof && !worker_cancel.is_cancelled());
            consumer.disarm();
            info!("{} 🛑 流 {} 播放线程退出", log_ctx(), stream_index);
        });

        workers.insert(
            stream_index,
            StreamWorker {
                cancel,
                handle: Some(handle),
            },
        );
    }

    /// 停止播放：通知所有 worker、逐个 join、累计已播放时长
    ///
    /// 返回时所有 worker 线程都已终止。空闲时是 no-op。
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        self.stop_locked(&mut inner);
    }

    fn stop_locked(&self, inner: &mut PlayerInner) {
        let Some(epoch) = inner.epoch.take() else {
            return;
        };

        for worker in inner.workers.values() {
            worker.cancel.cancel();
        }
        for (stream_index, mut worker) in inner.workers.drain() {
            if let Some(handle) = worker.handle.take() {
                if handle.join().is_err() {
                    warn!("{} ⚠️ 流 {} 播放线程异常退出", log_ctx(), stream_index);
                }
            }
        }

        // 累计已播放的墙钟时长，下次 play 从这里续拍
        inner.stop_position = epoch.offset_ms + epoch.elapsed_ms();
        info!("{} ⏹️ 停止播放，累计位置 {} ms", log_ctx(), inner.stop_position);
    }

    /// 等待所有 worker 自然播到流结尾（不发取消信号）
    pub fn join(&self) {
        let handles: Vec<(usize, JoinHandle<()>)> = {
            let mut inner = self.inner.lock();
            inner
                .workers
                .iter_mut()
                .filter_map(|(idx, worker)| worker.handle.take().map(|h| (*idx, h)))
                .collect()
        };
        for (stream_index, handle) in handles {
            if handle.join().is_err() {
                warn!("{} ⚠️ 流 {} 播放线程异常退出", log_ctx(), stream_index);
            }
        }

        let mut inner = self.inner.lock();
        if inner.workers.values().all(|w| w.handle.is_none()) {
            inner.workers.clear();
            if let Some(epoch) = inner.epoch.take() {
                inner.stop_position = epoch.offset_ms + epoch.elapsed_ms();
            }
        }
    }

    /// Seek 到目标位置（毫秒）
    ///
    /// 播放中会先停、seek、再续播；不可 seek 的数据源上是 no-op。
    pub fn seek(&self, time_ms: i64) -> Result<()> {
        let mut inner = self.inner.lock();
        if !self.router.is_seekable() {
            warn!("{} ⚠️ 数据源不支持 seek，忽略", log_ctx());
            return Ok(());
        }

        let was_playing = inner.epoch.is_some();
        if was_playing {
            self.stop_locked(&mut inner);
        }
        self.router.seek(time_ms)?;
        inner.stop_position = time_ms;
        if was_playing {
            self.play_locked(&mut inner)?;
        }
        Ok(())
    }

    /// 关闭播放器：停止全部 worker，刷出并释放每个解码器
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        self.stop_locked(&mut inner);

        for (stream_index, synced) in inner.enabled.drain() {
            let handle: Arc<dyn PacketConsumer> = synced.clone();
            self.router.remove_consumer(stream_index, &handle);
            if let Err(e) = self.router.set_buffering(stream_index, false) {
                warn!("{} ⚠️ 关闭流 {} 缓冲失败: {}", log_ctx(), stream_index, e);
            }
            synced.close_decoder();
        }
        info!("{} 🔒 播放器已关闭", log_ctx());
    }

    // ==================== 查询 ====================

    pub fn is_playing(&self) -> bool {
        self.inner.lock().epoch.is_some()
    }

    /// 权威当前位置（毫秒）- 由路由层按包 dts 推进
    pub fn position(&self) -> i64 {
        self.router.position()
    }

    pub fn duration_ms(&self) -> i64 {
        self.router.duration_ms()
    }

    /// 播放节拍位置（毫秒）：播放中 = 基准偏移 + 已流逝墙钟，
    /// 空闲 = 累计的停止位置
    pub fn playback_position(&self) -> i64 {
        let inner = self.inner.lock();
        match inner.epoch {
            Some(epoch) => epoch.offset_ms + epoch.elapsed_ms(),
            None => inner.stop_position,
        }
    }

    pub fn state(&self) -> PlayerState {
        let inner = self.inner.lock();
        let mut enabled_streams: Vec<usize> = inner.enabled.keys().copied().collect();
        enabled_streams.sort_unstable();
        PlayerState {
            state: if inner.epoch.is_some() {
                PlaybackState::Playing
            } else {
                PlaybackState::Idle
            },
            position: self.router.position(),
            duration: self.router.duration_ms(),
            enabled_streams,
        }
    }

    /// 预热管线（打开后可选调用一次）
    pub fn prefetch(&self) -> Result<usize> {
        self.router.prefetch()
    }

    pub fn router(&self) -> &Arc<StreamRouter> {
        &self.router
    }
}

impl Drop for MediaPlayer {
    fn drop(&mut self) {
        if self.inner.lock().epoch.is_some() {
            warn!("{} ⚠️ MediaPlayer 被 drop 时仍在播放，正在优雅停止", log_ctx());
        }
        self.close();
    }
}
