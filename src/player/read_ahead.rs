use crate::core::{MediaPacket, Result};
use crate::player::source::PacketSource;
use log::debug;
use std::collections::VecDeque;

/// 预读队列容量（包数）
pub const READ_AHEAD_CAPACITY: usize = 16;

/// 预读缓冲 - 包装 PacketSource，平滑数据源的延迟抖动
///
/// 维护一个有界的"已读出但未分发"包队列，并缓存 EOF 状态，
/// 避免到达结尾后反复打扰数据源。Seek 之后调用 `reset_eof()`
/// 才能继续读取。
///
/// 本组件不可重入，所有访问由 StreamRouter 持有的锁串行化。
pub struct ReadAheadBuffer {
    source: Box<dyn PacketSource>,
    queue: VecDeque<MediaPacket>,
    /// 缓存的 EOF 标志
    eof: bool,
}

impl ReadAheadBuffer {
    pub fn new(source: Box<dyn PacketSource>) -> Self {
        Self {
            source,
            queue: VecDeque::with_capacity(READ_AHEAD_CAPACITY),
            eof: false,
        }
    }

    /// 取下一个包：优先消费预读队列，再从数据源读取
    ///
    /// 返回 None 仅表示真正到达流结尾（EOF 会被缓存）。
    pub fn next(&mut self) -> Result<Option<MediaPacket>> {
        if let Some(packet) = self.queue.pop_front() {
            return Ok(Some(packet));
        }
        if self.eof {
            return Ok(None);
        }
        match self.source.read_packet()? {
            Some(packet) => Ok(Some(packet)),
            None => {
                debug!("📄 数据源到达结尾，缓存 EOF");
                self.eof = true;
                Ok(None)
            }
        }
    }

    /// 预读：阻塞读取数据源，把队列填到容量上限
    ///
    /// 打开或 seek 之后调用一次，预热管线。
    pub fn prefetch(&mut self) -> Result<usize> {
        let mut filled = 0;
        while self.queue.len() < READ_AHEAD_CAPACITY && !self.eof {
            match self.source.read_packet()? {
                Some(packet) => {
                    self.queue.push_back(packet);
                    filled += 1;
                }
                None => {
                    self.eof = true;
                    break;
                }
            }
        }
        if filled > 0 {
            debug!("📦 预读 {} 个包（队列 {}）", filled, self.queue.len());
        }
        Ok(filled)
    }

    /// 丢弃（释放）所有预读包，不再读取数据源 - seek 时使用
    pub fn drop_buffer(&mut self) {
        let dropped = self.queue.len();
        self.queue.clear();
        if dropped > 0 {
            debug!("🧹 丢弃预读队列: {} 个包", dropped);
        }
    }

    /// 清除缓存的 EOF，seek 之后恢复读取
    pub fn reset_eof(&mut self) {
        self.eof = false;
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn buffered_len(&self) -> usize {
        self.queue.len()
    }

    pub fn source(&self) -> &dyn PacketSource {
        self.source.as_ref()
    }

    pub fn source_mut(&mut self) -> &mut dyn PacketSource {
        self.source.as_mut()
    }
}
