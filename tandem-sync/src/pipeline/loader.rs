//! Media source loader backed by symphonia
//!
//! Opens a local audio file and reports its native sample rate, channel count
//! and frame count without decoding any audio. Probing runs on the blocking
//! pool so the engine context never waits on file I/O.

use super::{AudioFormat, MediaSourceLoader};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

/// Loader for `file://` URLs and plain filesystem paths
#[derive(Debug, Clone, Default)]
pub struct SymphoniaLoader {
    /// Relative paths are resolved against this folder
    root_folder: Option<PathBuf>,
}

impl SymphoniaLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root_folder(root_folder: impl Into<PathBuf>) -> Self {
        Self {
            root_folder: Some(root_folder.into()),
        }
    }

    fn resolve(&self, audio_url: &str) -> PathBuf {
        let raw = audio_url.strip_prefix("file://").unwrap_or(audio_url);
        let path = PathBuf::from(raw);
        match &self.root_folder {
            Some(root) if path.is_relative() => root.join(path),
            _ => path,
        }
    }
}

#[async_trait]
impl MediaSourceLoader for SymphoniaLoader {
    async fn open(&self, audio_url: &str) -> Result<AudioFormat> {
        let path = self.resolve(audio_url);
        let url = audio_url.to_string();

        tokio::task::spawn_blocking(move || probe_file(&path))
            .await
            .map_err(|e| Error::Load {
                url: url.clone(),
                reason: format!("probe task failed: {}", e),
            })?
            .map_err(|reason| Error::Load { url, reason })
    }
}

/// Read format parameters from the first audio track
fn probe_file(path: &Path) -> std::result::Result<AudioFormat, String> {
    debug!("Probing audio asset: {}", path.display());

    let file = std::fs::File::open(path)
        .map_err(|e| format!("failed to open {}: {}", path.display(), e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext_str) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(ext_str);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| format!("failed to probe format: {}", e))?;

    let track = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| "no audio track found".to_string())?;
    let params = &track.codec_params;

    let sample_rate = params
        .sample_rate
        .ok_or_else(|| "sample rate not found".to_string())?;
    let total_samples = params
        .n_frames
        .ok_or_else(|| "frame count not found".to_string())?;
    let channels = params.channels.map(|c| c.count() as u16).unwrap_or(2);

    debug!(
        "Audio asset format: sample_rate={}, channels={}, frames={}",
        sample_rate, channels, total_samples
    );

    Ok(AudioFormat {
        sample_rate,
        channels,
        total_samples,
    })
}
