use anyhow::{anyhow, Context, Result};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Intra-op threads per session.
const INTRA_THREADS: usize = 4;

/// ONNX Runtime session shared by every request.
///
/// `Session::run` needs exclusive access, so inference calls are serialized
/// through the mutex.
pub struct SharedSession {
    name: &'static str,
    session: Mutex<Session>,
}

impl SharedSession {
    /// Load an ONNX model, preferring CUDA and falling back to CPU.
    pub fn load(name: &'static str, model_path: &Path) -> Result<Self> {
        tracing::info!("Loading {} model from {}", name, model_path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(INTRA_THREADS)?
            .with_execution_providers([CUDAExecutionProvider::default().build()])?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load {} model from {}", name, model_path.display()))?;

        tracing::info!("{} model loaded successfully", name);

        Ok(Self {
            name,
            session: Mutex::new(session),
        })
    }

    /// Exclusive access to the session for one inference call.
    pub fn lock(&self) -> Result<MutexGuard<'_, Session>> {
        self.session
            .lock()
            .map_err(|_| anyhow!("{} session lock poisoned by a panicked inference", self.name))
    }
}

impl Drop for SharedSession {
    fn drop(&mut self) {
        tracing::info!("Releasing {} model", self.name);
    }
}
