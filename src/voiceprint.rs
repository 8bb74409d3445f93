//! Voiceprint verification wrapper. Embedding extraction happens in an
//! external neural backend; this side owns the enrolled print and the
//! cosine-similarity contract.

use parking_lot::Mutex;

use crate::error::{CoreError, CoreResult};

pub const EMBEDDING_DIM: usize = 192;

#[derive(Default)]
struct VerifierState {
    initialized: bool,
    enrolled: Option<Vec<f32>>,
}

#[derive(Default)]
pub struct VoiceprintVerifier {
    state: Mutex<VerifierState>,
}

impl VoiceprintVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the external embedding model as loaded.
    pub fn init(&self) {
        self.state.lock().initialized = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    pub fn embedding_dim(&self) -> usize {
        EMBEDDING_DIM
    }

    /// Store the reference embedding for later verification.
    pub fn enroll(&self, embedding: &[f32]) -> CoreResult<()> {
        let mut state = self.state.lock();
        if !state.initialized {
            return Err(CoreError::NotInitialized("voiceprint model not loaded"));
        }
        if embedding.len() != EMBEDDING_DIM {
            return Err(CoreError::invalid(format!(
                "expected {EMBEDDING_DIM}-dim embedding, got {}",
                embedding.len()
            )));
        }
        state.enrolled = Some(embedding.to_vec());
        Ok(())
    }

    /// Similarity of a probe against the enrolled print, in [-1, 1].
    pub fn verify(&self, embedding: &[f32]) -> CoreResult<f64> {
        let state = self.state.lock();
        if !state.initialized {
            return Err(CoreError::NotInitialized("voiceprint model not loaded"));
        }
        let Some(enrolled) = &state.enrolled else {
            return Err(CoreError::invalid("no enrolled voiceprint"));
        };
        cosine_similarity(enrolled, embedding)
    }
}

/// `dot(a, b) / (‖a‖·‖b‖)`; 0.0 when either norm vanishes.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> CoreResult<f64> {
    if a.len() != b.len() || a.is_empty() {
        return Err(CoreError::invalid(format!(
            "embedding length mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += x as f64 * y as f64;
        norm_a += x as f64 * x as f64;
        norm_b += y as f64 * y as f64;
    }

    if norm_a <= 0.0 || norm_b <= 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (norm_a.sqrt() * norm_b.sqrt()))
}
