use serde::{Deserialize, Serialize};

/// 流类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
    Other,
}

/// 时间基 - 有理数缩放因子，把容器刻度转换为实际时间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// 毫秒时间基（刻度 = 毫秒）
    pub const MILLIS: Rational = Rational { num: 1, den: 1000 };

    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }

    /// 把容器刻度转换为毫秒
    pub fn ticks_to_ms(&self, ticks: i64) -> i64 {
        (ticks as f64 * self.as_f64() * 1000.0) as i64
    }
}

/// 流信息 - 打开容器时探测一次，之后不可变
#[derive(Debug, Clone)]
pub struct StreamInfo {
    /// 流索引（容器生命周期内稳定）
    pub index: usize,
    pub kind: MediaKind,
    pub time_base: Rational,
    /// 总时长（容器刻度）
    pub duration: i64,
}

impl StreamInfo {
    /// 总时长（毫秒）
    pub fn duration_ms(&self) -> i64 {
        self.time_base.ticks_to_ms(self.duration)
    }
}

/// 媒体包（可跨线程传递）
///
/// 负载由当前持有者独占。释放即 Drop：所有权随值移动，
/// 路由层分发时只借出 `&MediaPacket`，分发完由持有者丢弃，
/// 因此"恰好释放一次"由类型系统保证。
#[derive(Debug)]
pub struct MediaPacket {
    pub stream_index: usize,
    pub kind: MediaKind,
    /// 显示时间戳（流时间基刻度），None 表示未知
    pub pts: Option<i64>,
    /// 解码时间戳（流时间基刻度），None 表示未知
    pub dts: Option<i64>,
    /// 不透明负载
    pub data: Vec<u8>,
}

/// 解码后的帧 - 进入同步门限前 pts 已换算为毫秒
#[derive(Debug, Clone)]
pub struct MediaFrame {
    pub stream_index: usize,
    pub kind: MediaKind,
    /// 显示时间戳（毫秒）
    pub pts: i64,
    pub data: Vec<u8>,
}

/// 播放状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Playing,
}

/// 播放器状态信息快照
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub state: PlaybackState,
    /// 当前位置（毫秒）
    pub position: i64,
    /// 总时长（毫秒）
    pub duration: i64,
    /// 当前启用的流索引
    pub enabled_streams: Vec<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rational_ticks_to_ms() {
        // 1/1000 时间基：刻度即毫秒
        assert_eq!(Rational::MILLIS.ticks_to_ms(1500), 1500);
        // 1/90000（MPEG-TS 常见时间基）
        let tb = Rational::new(1, 90000);
        assert_eq!(tb.ticks_to_ms(90000), 1000);
        assert_eq!(tb.ticks_to_ms(45000), 500);
    }

    #[test]
    fn test_rational_zero_den() {
        let tb = Rational::new(1, 0);
        assert_eq!(tb.ticks_to_ms(1234), 0);
    }

    #[test]
    fn test_stream_duration_ms() {
        let stream = StreamInfo {
            index: 0,
            kind: MediaKind::Video,
            time_base: Rational::new(1, 90000),
            duration: 900_000,
        };
        assert_eq!(stream.duration_ms(), 10_000);
    }
}
