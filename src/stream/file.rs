//! File contents as a frame stream.

use std::path::{Path, PathBuf};

use bytes::BytesMut;
use futures_util::stream::{self, StreamExt};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::TransportError;
use crate::stream::frames::FrameStream;

/// Chunk size used by `send_file` helpers.
pub const DEFAULT_FILE_CHUNK: usize = 64 * 1024;

enum FileState {
    Unopened(PathBuf),
    Open(File),
}

/// Read `path` lazily in chunks of at most `chunk` bytes.
///
/// The file is opened on first poll; open and read failures surface as
/// stream items.
pub fn file_frames(path: impl AsRef<Path>, chunk: usize) -> FrameStream {
    let chunk = chunk.max(1);
    let start = FileState::Unopened(path.as_ref().to_path_buf());

    stream::try_unfold(start, move |state| async move {
        let mut file = match state {
            FileState::Unopened(path) => File::open(&path).await?,
            FileState::Open(file) => file,
        };
        let mut buf = BytesMut::with_capacity(chunk);
        let read = file.read_buf(&mut buf).await?;
        if read == 0 {
            return Ok::<_, TransportError>(None);
        }
        Ok(Some((buf.freeze(), FileState::Open(file))))
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::frames::FrameStreamExt;

    #[tokio::test]
    async fn file_is_chunked() {
        let path = std::env::temp_dir().join(format!("netloop-file-{}", std::process::id()));
        let content: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        tokio::fs::write(&path, &content).await.unwrap();

        let frames: Vec<_> = file_frames(&path, 4096).collect().await;
        assert!(frames.len() >= 3);
        assert!(frames.iter().all(|f| f.as_ref().unwrap().len() <= 4096));

        let all = file_frames(&path, 4096).aggregate().await.unwrap();
        assert_eq!(&all[..], &content[..]);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn missing_file_is_an_error_item() {
        let mut frames = file_frames("/nonexistent/netloop-file", 16);
        assert!(matches!(frames.next().await, Some(Err(TransportError::Io(_)))));
    }
}
