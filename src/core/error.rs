use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("数据源错误: {0}")]
    Source(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("解码错误: {0}")]
    Decode(String),

    #[error("流 {stream_index} 的包缓冲区已满（容量 {capacity}）")]
    BufferFull { stream_index: usize, capacity: usize },

    #[error("Seek 失败: {0}")]
    Seek(String),

    #[error("未知的流索引: {0}")]
    UnknownStream(usize),

    #[error("其他错误: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, MediaError>;
