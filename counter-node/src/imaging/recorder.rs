use chrono::Local;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::info;

use crate::error::Result;

/// Writes annotated frames as a motion-JPEG stream (JPEG images back to back).
/// A file is opened on the first frame and closed by [`VideoRecorder::stop`];
/// frames still buffered when the recorder is dropped without `stop` are lost.
pub struct VideoRecorder {
    dir: PathBuf,
    current: Option<(PathBuf, BufWriter<File>)>,
    frames_written: u64,
}

impl VideoRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            current: None,
            frames_written: 0,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.current.is_some()
    }

    async fn open(&mut self, path: &Path) -> Result<()> {
        let file = File::create(path).await?;
        info!("Recording video to {}", path.display());
        self.current = Some((path.to_path_buf(), BufWriter::new(file)));
        self.frames_written = 0;
        Ok(())
    }

    pub async fn write_frame(&mut self, jpeg: &[u8]) -> Result<()> {
        if self.current.is_none() {
            fs::create_dir_all(&self.dir).await?;
            let name = format!("trafficount-{}.mjpeg", Local::now().format("%Y_%m_%d-%H_%M_%S"));
            let path = self.dir.join(name);
            self.open(&path).await?;
        }

        if let Some((_, writer)) = &mut self.current {
            writer.write_all(jpeg).await?;
            self.frames_written += 1;
        }
        Ok(())
    }

    /// Closes the current file. The recorder is idle afterwards even when the
    /// final flush fails.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some((path, mut writer)) = self.current.take() {
            writer.shutdown().await?;
            info!(
                "Recording {} closed after {} frames",
                path.display(),
                self.frames_written
            );
        }
        Ok(())
    }

    /// Records into `path` instead of a timestamped file.
    #[cfg(test)]
    pub(crate) async fn start_at(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.open(path.as_ref()).await
    }
}
