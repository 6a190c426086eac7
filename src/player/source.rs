use crate::core::{MediaPacket, Result, StreamInfo};

/// 容器数据源抽象接口
///
/// 对单个容器的顺序、有状态游标：按容器顺序产出下一个包，
/// 或到达流结尾。不同的媒体源（本地文件、网络流、内存流等）
/// 都可以实现这个接口。
///
/// 注意：实现不要求可重入，所有访问由 StreamRouter 的粗锁串行化。
pub trait PacketSource: Send {
    /// 读取下一个媒体包
    ///
    /// 返回：
    /// - Ok(Some(packet)): 成功读取一个包
    /// - Ok(None): 到达流结尾（不是错误）
    /// - Err(e): 读取错误
    fn read_packet(&mut self) -> Result<Option<MediaPacket>>;

    /// 粗粒度 Seek 到目标时间附近（毫秒）
    ///
    /// 实现可以落在 [min_ms, max_ms] 窗口内任意可定位点（通常是
    /// target_ms 之前最近的关键帧）。
    fn seek(&mut self, min_ms: i64, target_ms: i64, max_ms: i64) -> Result<()>;

    /// 是否支持 seek（直播流等不支持）
    fn is_seekable(&self) -> bool {
        true
    }

    /// 总时长（毫秒），未知返回 0
    fn duration_ms(&self) -> i64;

    /// 流数量
    fn stream_count(&self) -> usize;

    /// 按索引获取流信息
    fn stream(&self, index: usize) -> Option<&StreamInfo>;

    /// 获取描述信息（用于调试）
    fn description(&self) -> String;
}
