use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("读取宿主快照 {path:?} 失败: {source}")]
    SnapshotRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析宿主快照 {path:?} 失败: {source}")]
    SnapshotParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("写入宿主快照 {path:?} 失败: {source}")]
    SnapshotWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("命令参数不是合法 JSON: {0}")]
    InvalidParams(#[source] serde_json::Error),
    #[error("编码输出失败: {0}")]
    Encode(#[source] serde_json::Error),
}
