use std::path::Path;

use ort::execution_providers::ExecutionProviderDispatch;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;

/// Hardware-accelerated providers for the current platform. ONNX Runtime
/// falls back to CPU when none of them can be registered.
pub fn preferred_execution_providers() -> Vec<ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

/// Opens an inference session with full graph optimization and one intra-op
/// thread per available core.
pub fn open_session(model_path: &Path) -> Result<Session, Box<dyn std::error::Error>> {
    let intra_threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_inter_threads(1)?
        .with_intra_threads(intra_threads)?
        .with_execution_providers(preferred_execution_providers())?
        .commit_from_file(model_path)?;
    log::debug!("Loaded ONNX model {}", model_path.display());
    Ok(session)
}

/// Square input side declared by an NCHW model, if static.
pub fn square_input_size(session: &Session) -> Option<u32> {
    let input = session.inputs().first()?;
    match input.dtype() {
        ort::value::ValueType::Tensor { shape, .. } if shape.len() >= 4 && shape[2] > 0 => {
            Some(shape[2] as u32)
        }
        _ => None,
    }
}
