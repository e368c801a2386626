//! The inference engine: exclusive owner of the loaded vision model.
//!
//! The model is hosted by an external runner process. `load()` spawns the
//! runner with the configured weights, device, and precision and waits for
//! its readiness line; `infer()` sends one JSON request line per frame over
//! the runner's stdin and captures the console emission from its stdout via
//! [`crate::pipeline::capture`]; `unload()` kills the runner, releasing
//! accelerator memory. States are `Unloaded → Loaded → Unloaded`;
//! extraction requires `Loaded`.
//!
//! Every call here is blocking. The orchestrator runs the whole per-document
//! loop on `spawn_blocking`, so the async scheduler's main loop never waits
//! on the runner. The engine is not internally synchronised — exclusive
//! access comes from [`crate::context::EnginePool`] (one slot, process-wide).

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::capture::{self, CaptureError};
use crate::prompts::CONVERSION_PROMPT;
use serde::Serialize;
use std::io::{BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Attention backend the runner settled on at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttentionBackend {
    /// Fused/accelerated attention kernels.
    Accelerated,
    /// Standard attention; used when the accelerated backend is refused.
    Standard,
}

impl AttentionBackend {
    fn flag(self) -> &'static str {
        match self {
            AttentionBackend::Accelerated => "flash",
            AttentionBackend::Standard => "standard",
        }
    }
}

/// Failure modes of a single inference call.
///
/// The orchestrator wraps these with the failing page number; see
/// [`PipelineError::InferenceFailed`].
#[derive(Debug, Error)]
pub enum InferError {
    #[error("inference engine is not loaded")]
    NotLoaded,
    #[error("{0}")]
    Stream(#[from] CaptureError),
    #[error("request write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("request encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One request line sent to the runner.
#[derive(Serialize)]
struct InferRequest<'a> {
    prompt: &'a str,
    image: &'a str,
    base_size: u32,
    image_size: u32,
    crop_mode: bool,
}

struct RunnerHandle {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    attention: AttentionBackend,
}

/// Wrapper around the vision model runner ("Eyes").
pub struct InferenceEngine {
    config: PipelineConfig,
    runner: Option<RunnerHandle>,
}

impl InferenceEngine {
    /// Create an engine in the `Unloaded` state.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            runner: None,
        }
    }

    /// Whether the model is currently loaded.
    pub fn is_loaded(&self) -> bool {
        self.runner.is_some()
    }

    /// The attention backend in use, when loaded.
    pub fn attention(&self) -> Option<AttentionBackend> {
        self.runner.as_ref().map(|r| r.attention)
    }

    /// Load the model: spawn the runner and wait for readiness.
    ///
    /// Tries the accelerated attention backend first and falls back to the
    /// standard backend when the runner refuses it. Returns an error (not a
    /// panic) when the weights path is absent or neither backend comes up.
    /// Not idempotent — callers check [`is_loaded`](Self::is_loaded) first.
    pub fn load(&mut self) -> Result<(), PipelineError> {
        if !self.config.model_path.exists() {
            return Err(PipelineError::WeightsNotFound {
                path: self.config.model_path.clone(),
            });
        }

        info!(
            "Loading {} from {}",
            self.config.model_name,
            self.config.model_path.display()
        );

        match self.spawn_runner(AttentionBackend::Accelerated) {
            Ok(handle) => {
                info!("Loaded with accelerated attention");
                self.runner = Some(handle);
                Ok(())
            }
            Err(accel_err) => {
                warn!("Accelerated attention not available: {accel_err}");
                info!("Falling back to standard attention");
                let handle = self
                    .spawn_runner(AttentionBackend::Standard)
                    .map_err(|detail| PipelineError::RunnerUnavailable { detail })?;
                self.runner = Some(handle);
                Ok(())
            }
        }
    }

    fn spawn_runner(&self, attention: AttentionBackend) -> Result<RunnerHandle, String> {
        let mut child = Command::new(&self.config.runner_path)
            .arg("serve")
            .arg("--weights")
            .arg(&self.config.model_path)
            .arg("--device")
            .arg(&self.config.device)
            .arg("--precision")
            .arg(&self.config.precision)
            .arg("--attention")
            .arg(attention.flag())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| format!("failed to spawn '{}': {e}", self.config.runner_path.display()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| "runner stdin unavailable".to_string())?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| "runner stdout unavailable".to_string())?;
        let mut stdout = BufReader::new(stdout);

        match capture::await_ready(&mut stdout) {
            Ok(reported) => {
                debug!("Runner ready ({reported}) on {}", self.config.device);
                Ok(RunnerHandle {
                    child,
                    stdin,
                    stdout,
                    attention,
                })
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(e.to_string())
            }
        }
    }

    /// Run one inference call for one frame.
    ///
    /// Sends the fixed structure-preserving conversion instruction together
    /// with the frame path, the profile's `target_size`, and the fixed
    /// patch dimension; captures everything the model emits for this call.
    /// The returned bytes are raw — harness diagnostics included — and go
    /// through [`crate::pipeline::sanitize`] next. Blocking and
    /// compute-bound; never call on the async scheduler's main loop.
    pub fn infer(&mut self, frame_path: &Path, target_size: u32) -> Result<Vec<u8>, InferError> {
        let patch_size = self.config.patch_size;
        let crop_mode = self.config.crop_mode;
        let runner = self.runner.as_mut().ok_or(InferError::NotLoaded)?;

        let image = frame_path.to_string_lossy();
        let request = InferRequest {
            prompt: CONVERSION_PROMPT,
            image: &image,
            base_size: target_size,
            image_size: patch_size,
            crop_mode,
        };

        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        runner.stdin.write_all(line.as_bytes())?;
        runner.stdin.flush()?;

        let emission = capture::capture_emission(&mut runner.stdout)?;
        debug!("Captured {} bytes of emission", emission.len());
        Ok(emission)
    }

    /// Unload the model: kill and reap the runner, freeing accelerator
    /// memory. Safe no-op when already unloaded; `load()` restores service.
    pub fn unload(&mut self) {
        if let Some(mut handle) = self.runner.take() {
            drop(handle.stdin);
            let _ = handle.child.kill();
            let _ = handle.child.wait();
            info!("{} unloaded, accelerator memory freed", self.config.model_name);
        }
    }

    pub(crate) fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

impl Drop for InferenceEngine {
    fn drop(&mut self) {
        self.unload();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Runner that refuses flash attention and otherwise echoes a canned
    /// emission per request.
    const STANDARD_ONLY_RUNNER: &str = r#"#!/bin/sh
for a in "$@"; do
  if [ "$a" = "flash" ]; then
    echo "<<error>> flash attention kernels missing"
    exit 1
  fi
done
echo "READY standard"
while read line; do
  echo "BASE: 1024x1024"
  echo "recognised text"
  echo "<<done>>"
done
"#;

    /// Runner that accepts any attention backend.
    const FLASH_RUNNER: &str = r#"#!/bin/sh
echo "READY flash"
while read line; do
  echo "page body"
  echo "<<done>>"
done
"#;

    fn write_runner(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("runner.sh");
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn engine_with(runner_body: &str, dir: &TempDir) -> InferenceEngine {
        let weights = dir.path().join("weights");
        fs::create_dir_all(&weights).unwrap();
        let config = PipelineConfig::builder()
            .model_path(&weights)
            .runner_path(write_runner(dir, runner_body))
            .device("cpu")
            .build()
            .unwrap();
        InferenceEngine::new(config)
    }

    #[test]
    fn load_fails_when_weights_missing() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig::builder()
            .model_path(dir.path().join("nope"))
            .runner_path(write_runner(&dir, FLASH_RUNNER))
            .build()
            .unwrap();
        let mut engine = InferenceEngine::new(config);
        assert!(matches!(
            engine.load(),
            Err(PipelineError::WeightsNotFound { .. })
        ));
        assert!(!engine.is_loaded());
    }

    #[test]
    fn load_uses_accelerated_backend_when_available() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_with(FLASH_RUNNER, &dir);
        engine.load().unwrap();
        assert_eq!(engine.attention(), Some(AttentionBackend::Accelerated));
    }

    #[test]
    fn load_falls_back_to_standard_attention() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_with(STANDARD_ONLY_RUNNER, &dir);
        engine.load().unwrap();
        assert!(engine.is_loaded());
        assert_eq!(engine.attention(), Some(AttentionBackend::Standard));
    }

    #[test]
    fn infer_round_trip_captures_emission() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_with(STANDARD_ONLY_RUNNER, &dir);
        engine.load().unwrap();

        let frame = dir.path().join("page0.png");
        fs::write(&frame, b"fake png").unwrap();

        let emission = engine.infer(&frame, 1024).unwrap();
        let text = String::from_utf8(emission).unwrap();
        assert!(text.contains("recognised text"));
        assert!(text.contains("BASE:"));

        // The stream stays aligned for a second call.
        let again = engine.infer(&frame, 512).unwrap();
        assert!(String::from_utf8(again).unwrap().contains("recognised text"));
    }

    #[test]
    fn infer_requires_loaded_state() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_with(FLASH_RUNNER, &dir);
        let err = engine.infer(Path::new("x.png"), 1024).unwrap_err();
        assert!(matches!(err, InferError::NotLoaded));
    }

    #[test]
    fn unload_is_noop_when_unloaded_and_reload_restores() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_with(FLASH_RUNNER, &dir);
        engine.unload();
        assert!(!engine.is_loaded());

        engine.load().unwrap();
        engine.unload();
        assert!(!engine.is_loaded());

        engine.load().unwrap();
        assert!(engine.is_loaded());
    }
}
