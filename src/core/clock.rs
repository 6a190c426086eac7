use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// 播放基准点 - 用于音视频同步
///
/// `started_at` 对应逻辑时间 `offset_ms` 的墙钟时刻。
/// play/stop/seek 在调度器粗锁内重算，worker 启动时捕获一份副本，
/// 之后只读自己的副本，稳态播放无读竞争。
#[derive(Debug, Clone, Copy)]
pub struct SyncPoint {
    pub started_at: Instant,
    /// 逻辑起始偏移（毫秒）
    pub offset_ms: i64,
}

impl SyncPoint {
    /// 以当前墙钟时刻为基准，从指定逻辑偏移开始
    pub fn starting_at(offset_ms: i64) -> Self {
        Self {
            started_at: Instant::now(),
            offset_ms,
        }
    }

    /// 基准点建立以来经过的墙钟时间（毫秒）
    pub fn elapsed_ms(&self) -> i64 {
        self.started_at.elapsed().as_millis() as i64
    }

    /// 帧相对当前时刻的提前量（毫秒）
    ///
    /// 正数表示显示时间还没到，负数表示已经迟到。
    pub fn delta_ms(&self, pts_ms: i64) -> i64 {
        (pts_ms - self.offset_ms) - self.elapsed_ms()
    }
}

/// 协作式取消令牌
///
/// 布尔停止标志的升级版：条件变量支持可取消的定时等待，
/// 同步门限睡眠中途被取消时能立即醒来，收紧停止延迟上界。
pub struct CancelToken {
    cancelled: Mutex<bool>,
    condvar: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// 请求取消，唤醒所有等待中的线程
    pub fn cancel(&self) {
        let mut cancelled = self.cancelled.lock();
        *cancelled = true;
        self.condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.lock()
    }

    /// 可取消的定时等待
    ///
    /// 返回 true 表示等待期间令牌被取消（等待可能未满时长）。
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cancelled = self.cancelled.lock();
        while !*cancelled {
            if self.condvar.wait_until(&mut cancelled, deadline).timed_out() {
                break;
            }
        }
        *cancelled
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
