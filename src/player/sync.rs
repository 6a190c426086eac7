use crate::core::{CancelToken, MediaKind, SyncPoint};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 音视频同步参数
///
/// 这些数值直接影响可观察的同步行为，来自长期实践的固定值，
/// 不要擅自"推导"更优策略；确有需要时通过配置覆盖。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// 直播源播放基准的回退余量（毫秒），吸收网络抖动
    pub live_delay_ms: i64,
    /// 视频帧迟到超过该值即丢弃（毫秒）
    pub video_drop_threshold_ms: i64,
    /// 音频帧迟到超过该值即丢弃（毫秒）
    pub audio_drop_threshold_ms: i64,
    /// 音频提前偏置（毫秒）- 音频刻意跑在前面，为输出缓冲留填充时间
    pub audio_bias_ms: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            live_delay_ms: 500,
            video_drop_threshold_ms: 10,
            audio_drop_threshold_ms: 100,
            audio_bias_ms: 500,
        }
    }
}

impl SyncConfig {
    /// 按媒体类型取对应的门限策略
    pub fn policy_for(&self, kind: MediaKind) -> SyncPolicy {
        match kind {
            MediaKind::Audio => SyncPolicy {
                bias_ms: self.audio_bias_ms,
                drop_threshold_ms: self.audio_drop_threshold_ms,
            },
            MediaKind::Video | MediaKind::Other => SyncPolicy {
                bias_ms: 0,
                drop_threshold_ms: self.video_drop_threshold_ms,
            },
        }
    }
}

/// 单个流的门限策略（偏置 + 丢弃阈值）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    pub bias_ms: i64,
    pub drop_threshold_ms: i64,
}

/// 门限裁决
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// 等待指定毫秒后呈现
    Wait(i64),
    /// 立即呈现
    Present,
    /// 迟到过久，丢弃
    Drop,
}

/// 同步门限 - 逐帧节拍控制
///
/// 解码器每产出一帧，按帧的显示时间戳相对播放基准点的提前量
/// 决定：睡到点再呈现、立即呈现、或者丢弃。
pub struct SyncGate {
    policy: SyncPolicy,
}

impl SyncGate {
    pub fn new(policy: SyncPolicy) -> Self {
        Self { policy }
    }

    pub fn for_kind(config: &SyncConfig, kind: MediaKind) -> Self {
        Self::new(config.policy_for(kind))
    }

    /// 纯裁决：对给定提前量（毫秒）应用偏置和丢弃阈值
    pub fn decide(&self, delta_ms: i64) -> GateDecision {
        let delta = delta_ms - self.policy.bias_ms;
        if delta > 0 {
            GateDecision::Wait(delta)
        } else if delta < -self.policy.drop_threshold_ms {
            GateDecision::Drop
        } else {
            GateDecision::Present
        }
    }

    /// 为一帧定节拍。返回 true 表示应当呈现（必要时已等到显示时间）。
    ///
    /// 等待被取消令牌打断时仍然呈现当前帧 - 取消的是等待，
    /// 不是帧本身；只记一条警告，绝不向上抛。
    pub fn pace(&self, pts_ms: i64, point: &SyncPoint, cancel: &CancelToken) -> bool {
        match self.decide(point.delta_ms(pts_ms)) {
            GateDecision::Wait(wait_ms) => {
                let interrupted = cancel.wait_timeout(Duration::from_millis(wait_ms as u64));
                if interrupted {
                    warn!("⚠️ 同步等待被中断（pts={} ms），仍然呈现当前帧", pts_ms);
                }
                true
            }
            GateDecision::Present => true,
            GateDecision::Drop => {
                debug!("🗑️ 丢帧: pts={} ms 迟到超过 {} ms", pts_ms, self.policy.drop_threshold_ms);
                false
            }
        }
    }
}
