use crate::core::{MediaError, MediaKind, MediaPacket, Rational, Result, StreamInfo};
use crate::player::source::PacketSource;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{format, media};
use log::{debug, info};

/// 基于 FFmpeg 的容器数据源
pub struct FfmpegSource {
    input_ctx: format::context::Input,
    streams: Vec<StreamInfo>,
    source_path: String,
    seekable: bool,
}

impl FfmpegSource {
    /// 打开媒体文件或网络流
    pub fn open(path: &str) -> Result<Self> {
        info!("正在打开媒体源: {}", path);

        let input_ctx = if Self::is_network(path) {
            // 网络流：丢弃损坏帧、补生成 PTS，降低启动延迟
            let mut options = ffmpeg::Dictionary::new();
            options.set("fflags", "+discardcorrupt+genpts");
            options.set("analyzeduration", "5000000");
            format::input_with_dictionary(&path, options)
                .map_err(|e| MediaError::Source(format!("无法打开网络流 {}: {}", path, e)))?
        } else {
            format::input(&path)
                .map_err(|e| MediaError::Source(format!("无法打开文件 {}: {}", path, e)))?
        };

        let streams: Vec<StreamInfo> = input_ctx
            .streams()
            .map(|s| {
                let tb = s.time_base();
                StreamInfo {
                    index: s.index(),
                    kind: match s.parameters().medium() {
                        media::Type::Video => MediaKind::Video,
                        media::Type::Audio => MediaKind::Audio,
                        _ => MediaKind::Other,
                    },
                    time_base: Rational::new(tb.numerator(), tb.denominator()),
                    duration: s.duration(),
                }
            })
            .collect();

        for stream in &streams {
            debug!(
                "流 {}: {:?}, time_base {}/{}",
                stream.index, stream.kind, stream.time_base.num, stream.time_base.den
            );
        }

        // 实时协议不支持 seek
        let seekable = !path.starts_with("rtsp://") && !path.starts_with("rtmp://");

        Ok(Self {
            input_ctx,
            streams,
            source_path: path.to_string(),
            seekable,
        })
    }

    fn is_network(path: &str) -> bool {
        path.starts_with("http://")
            || path.starts_with("https://")
            || path.starts_with("rtsp://")
            || path.starts_with("rtmp://")
            || path.contains(".m3u8")
    }
}

impl PacketSource for FfmpegSource {
    fn read_packet(&mut self) -> Result<Option<MediaPacket>> {
        match self.input_ctx.packets().next() {
            Some((stream, packet)) => {
                let index = stream.index();
                let kind = self
                    .streams
                    .iter()
                    .find(|s| s.index == index)
                    .map(|s| s.kind)
                    .unwrap_or(MediaKind::Other);
                Ok(Some(MediaPacket {
                    stream_index: index,
                    kind,
                    pts: packet.pts(),
                    dts: packet.dts(),
                    data: packet.data().map(|d| d.to_vec()).unwrap_or_default(),
                }))
            }
            None => Ok(None),
        }
    }

    fn seek(&mut self, min_ms: i64, target_ms: i64, max_ms: i64) -> Result<()> {
        // 毫秒转微秒（AV_TIME_BASE 刻度）
        let min = min_ms.saturating_mul(1000);
        let target = target_ms.saturating_mul(1000);
        let max = max_ms.saturating_mul(1000);
        self.input_ctx
            .seek(target, min..=max)
            .map_err(|e| MediaError::Seek(e.to_string()))
    }

    fn is_seekable(&self) -> bool {
        self.seekable
    }

    fn duration_ms(&self) -> i64 {
        // 微秒转毫秒；未知时长为负值
        (self.input_ctx.duration() / 1000).max(0)
    }

    fn stream_count(&self) -> usize {
        self.streams.len()
    }

    fn stream(&self, index: usize) -> Option<&StreamInfo> {
        self.streams.get(index)
    }

    fn description(&self) -> String {
        format!("FFmpeg 数据源: {}", self.source_path)
    }
}
