//! Synthetic image input for the prediction endpoint.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::ProbeResult;

/// Side length of the square grayscale image the service expects.
pub const IMAGE_SIDE: usize = 48;
/// Number of pixels in one image, row-major.
pub const IMAGE_LEN: usize = IMAGE_SIDE * IMAGE_SIDE;

/// Request body for `/predict`: `{"image": [f32; IMAGE_LEN]}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImagePayload {
    image: Vec<f32>,
}

impl ImagePayload {
    /// Fresh payload drawn from the thread-local generator.
    pub fn random() -> Self {
        Self::from_rng(&mut rand::rng())
    }

    /// Reproducible payload for a given seed.
    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(&mut StdRng::seed_from_u64(seed))
    }

    /// Draws `IMAGE_LEN` independent uniform values in `[0, 1)`.
    pub fn from_rng<R: Rng>(rng: &mut R) -> Self {
        let image = (0..IMAGE_LEN).map(|_| rng.random::<f32>()).collect();
        Self { image }
    }

    pub fn pixels(&self) -> &[f32] {
        &self.image
    }

    pub fn len(&self) -> usize {
        self.image.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }

    pub fn to_json(&self) -> ProbeResult<Vec<u8>> {
        Ok(sonic_rs::to_vec(self)?)
    }
}
