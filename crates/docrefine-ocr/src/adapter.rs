//! Lazy, fallback-capable adapter implementing the recognition boundary.

use crate::engine::{Device, RecognitionEngine};
use docrefine_core::{PredictedCell, RecognizedLine, RegionRecognizer, Result};
use image::GrayImage;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Environment variable overriding the assets directory.
const ASSETS_ENV: &str = "DOCREFINE_OCR_ASSETS";

/// Model lifecycle: loading happens exactly once, on first use.
enum AdapterState {
    /// No load attempt yet.
    Unloaded,
    /// Models are live.
    Ready(Box<RecognitionEngine>),
    /// The load attempt failed; the adapter stays disabled for its
    /// lifetime and every call is a no-op.
    Disabled,
}

/// Recognition adapter over lazily-loaded ONNX sessions.
///
/// Initialization is idempotent and safe under concurrent first use: the
/// state lock admits exactly one loader, concurrent callers block until
/// the state settles, and later calls read the settled state without
/// re-entering load logic. A CUDA-capable host is tried first; session
/// construction falls back to CPU. If no device works, the adapter is
/// permanently disabled — recognition calls return empty predictions and
/// the enhancement workflow keeps original values.
pub struct OcrAdapter {
    assets_dir: PathBuf,
    state: Mutex<AdapterState>,
}

impl std::fmt::Debug for OcrAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrAdapter")
            .field("assets_dir", &self.assets_dir)
            .finish_non_exhaustive()
    }
}

impl OcrAdapter {
    /// Creates an adapter loading models from `assets_dir` on first use.
    ///
    /// Construction never fails: a missing or unusable directory shows
    /// up as a disabled adapter when the first recognition call arrives.
    #[must_use = "creates a new OcrAdapter"]
    pub fn with_assets(assets_dir: impl Into<PathBuf>) -> Self {
        Self {
            assets_dir: assets_dir.into(),
            state: Mutex::new(AdapterState::Unloaded),
        }
    }

    /// Creates an adapter using the default assets location: the
    /// `DOCREFINE_OCR_ASSETS` environment variable if set, otherwise the
    /// crate's `assets/` directory.
    #[must_use = "creates a new OcrAdapter"]
    pub fn with_default_assets() -> Self {
        Self::with_assets(default_assets_dir())
    }

    /// Whether the models loaded successfully. Triggers the load if it
    /// has not happened yet.
    #[must_use = "readiness state is returned but not used"]
    pub fn is_ready(&self) -> bool {
        matches!(&*self.state_loaded(), AdapterState::Ready(_))
    }

    /// Lock the state, performing the one-time load if still unloaded.
    fn state_loaded(&self) -> MutexGuard<'_, AdapterState> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if matches!(*state, AdapterState::Unloaded) {
            *state = match self.try_load() {
                Some(engine) => AdapterState::Ready(Box::new(engine)),
                None => {
                    log::error!(
                        "recognition models unavailable; enhancement calls will be no-ops"
                    );
                    AdapterState::Disabled
                }
            };
        }
        state
    }

    /// One load attempt: CUDA first (unless forced off), CPU fallback.
    fn try_load(&self) -> Option<RecognitionEngine> {
        let force_cpu = std::env::var_os("ORT_FORCE_CPU").is_some();

        if !force_cpu {
            match RecognitionEngine::load(&self.assets_dir, Device::Cuda) {
                Ok(engine) => return Some(engine),
                Err(e) => {
                    log::warn!("CUDA session setup failed, retrying on CPU: {e}");
                }
            }
        }

        match RecognitionEngine::load(&self.assets_dir, Device::Cpu) {
            Ok(engine) => Some(engine),
            Err(e) => {
                log::error!("failed to load recognition models: {e}");
                None
            }
        }
    }
}

impl RegionRecognizer for OcrAdapter {
    fn recognize_region(
        &self,
        region: &GrayImage,
        math_mode: bool,
    ) -> Result<Vec<RecognizedLine>> {
        match &mut *self.state_loaded() {
            AdapterState::Ready(engine) => engine.recognize_region(region, math_mode),
            _ => Ok(Vec::new()),
        }
    }

    fn recognize_table_structure(&self, table: &GrayImage) -> Result<Vec<PredictedCell>> {
        match &mut *self.state_loaded() {
            AdapterState::Ready(engine) => engine.table_structure(table),
            _ => Ok(Vec::new()),
        }
    }
}

/// Resolve the default assets directory.
fn default_assets_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(ASSETS_ENV) {
        return PathBuf::from(dir);
    }
    if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
        let assets = Path::new(&manifest_dir).join("assets");
        if assets.is_dir() {
            return assets;
        }
    }
    PathBuf::from("crates/docrefine-ocr/assets")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use std::sync::Arc;
    use std::thread;

    fn blank_region() -> GrayImage {
        GrayImage::from_pixel(64, 32, Luma([255]))
    }

    #[test]
    fn missing_assets_disable_the_adapter() {
        let adapter = OcrAdapter::with_assets("/nonexistent/assets");
        assert!(!adapter.is_ready());

        // Disabled calls are no-ops, never errors.
        let lines = adapter.recognize_region(&blank_region(), false).unwrap();
        assert!(lines.is_empty());
        let cells = adapter
            .recognize_table_structure(&blank_region())
            .unwrap();
        assert!(cells.is_empty());
    }

    #[test]
    fn disabled_state_settles_once() {
        let adapter = Arc::new(OcrAdapter::with_assets("/nonexistent/assets"));

        // Concurrent first use: every caller observes a settled state and
        // a no-op result; only one load attempt runs.
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let adapter = Arc::clone(&adapter);
                thread::spawn(move || {
                    let lines = adapter.recognize_region(&blank_region(), true).unwrap();
                    assert!(lines.is_empty());
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(!adapter.is_ready());
    }
}
