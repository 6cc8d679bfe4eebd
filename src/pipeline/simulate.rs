//! Deterministic stand-in for a model.
//!
//! Used when a domain has no loadable model, or when a loaded model fails at
//! run time. Identical input bytes always produce the identical distribution,
//! on every platform and build. Results are biased toward the domain's benign
//! class and always carry `Source::Simulated`.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::types::{InferenceResult, Source};
use crate::domain::Domain;

/// Only this many leading bytes are hashed, together with the total length.
pub const HASH_PREFIX_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy)]
pub struct FallbackSimulator {
    prefix_len: usize,
}

impl Default for FallbackSimulator {
    fn default() -> Self {
        Self {
            prefix_len: HASH_PREFIX_BYTES,
        }
    }
}

impl FallbackSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// ChaCha seed derived from the raw upload bytes.
    pub fn seed(&self, raw: &[u8]) -> [u8; 32] {
        let prefix = &raw[..raw.len().min(self.prefix_len)];
        let mut hasher = Sha256::new();
        hasher.update(prefix);
        hasher.update((raw.len() as u64).to_le_bytes());
        hasher.finalize().into()
    }

    pub fn simulate(&self, raw: &[u8], domain: Domain) -> InferenceResult {
        let descriptor = domain.descriptor();
        let profile = descriptor.simulation;
        let classes = descriptor.num_classes();
        let mut rng = ChaCha8Rng::from_seed(self.seed(raw));

        let benign = profile.floor + profile.span * rng.gen::<f32>();
        let weights: Vec<f32> = (0..classes)
            .map(|i| {
                if i == profile.benign_index {
                    0.0
                } else {
                    0.05 + rng.gen::<f32>()
                }
            })
            .collect();
        let weight_sum: f32 = weights.iter().sum();

        let mut probabilities: Vec<f32> = weights
            .iter()
            .enumerate()
            .map(|(i, w)| {
                if i == profile.benign_index {
                    benign
                } else if weight_sum > 0.0 {
                    (1.0 - benign) * w / weight_sum
                } else {
                    0.0
                }
            })
            .collect();
        let total: f32 = probabilities.iter().sum();
        probabilities.iter_mut().for_each(|p| *p /= total);

        debug!(%domain, benign, "Simulated inference");
        InferenceResult::new(probabilities, Source::Simulated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::png;

    #[test]
    fn identical_bytes_identical_result() {
        let sim = FallbackSimulator::new();
        let image = png(300, 300, [0, 0, 0]);
        let a = sim.simulate(&image, Domain::Pneumonia);
        let b = sim.simulate(&image, Domain::Pneumonia);
        assert_eq!(a, b);
        assert_eq!(a.source, Source::Simulated);
    }

    #[test]
    fn distributions_sum_to_one() {
        let sim = FallbackSimulator::new();
        for domain in Domain::ALL {
            for seed_bytes in [&b"a"[..], &b"abc"[..], &[0u8; 10_000][..]] {
                let r = sim.simulate(seed_bytes, domain);
                assert_eq!(r.probabilities.len(), domain.descriptor().num_classes());
                assert!((r.sum() - 1.0).abs() < 1e-5, "{domain}: {}", r.sum());
                assert!(r.probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
            }
        }
    }

    #[test]
    fn benign_class_biased() {
        let sim = FallbackSimulator::new();
        for domain in Domain::ALL {
            let profile = domain.descriptor().simulation;
            for n in 0..50u32 {
                let r = sim.simulate(&n.to_le_bytes(), domain);
                let benign = r.probabilities[profile.benign_index];
                assert!(benign >= profile.floor - 1e-4, "{domain}: {benign}");
                assert!(benign < profile.floor + profile.span + 1e-4);
            }
        }
    }

    #[test]
    fn black_chest_xray_reads_normal() {
        let sim = FallbackSimulator::new();
        let r = sim.simulate(&png(300, 300, [0, 0, 0]), Domain::Pneumonia);
        assert!(r.probabilities[0] > 0.5);
        assert!(r.probabilities[1] < 0.5);
    }

    #[test]
    fn seed_uses_prefix_and_length() {
        let sim = FallbackSimulator::new();
        let mut a = vec![7u8; 5000];
        let b = a.clone();
        // Past the hashed prefix: same seed.
        a[4500] = 8;
        assert_eq!(sim.seed(&a), sim.seed(&b));
        // Inside the prefix: different seed.
        a[10] = 9;
        assert_ne!(sim.seed(&a), sim.seed(&b));
        // Same prefix, different length: different seed.
        assert_ne!(sim.seed(&b[..4999]), sim.seed(&b));
    }

    fn bits(r: &InferenceResult) -> Vec<u32> {
        r.probabilities.iter().map(|p| p.to_bits()).collect()
    }

    // Pinned outputs: any change here breaks agreement with results already
    // reported for the same upload.
    #[test]
    fn pneumonia_output_is_pinned() {
        let sim = FallbackSimulator::new();
        let r = sim.simulate(b"MEDVISION-GOLDEN-CHEST-XRAY", Domain::Pneumonia);
        assert_eq!(bits(&r), vec![0x3f32_0745, 0x3e9b_f176]);

        let r = sim.simulate(&[0u8; 1024], Domain::Pneumonia);
        assert_eq!(bits(&r), vec![0x3f4f_b316, 0x3e41_33a8]);
    }

    #[test]
    fn skin_lesion_output_is_pinned() {
        let sim = FallbackSimulator::new();
        let r = sim.simulate(b"MEDVISION-GOLDEN-SKIN-LESION", Domain::SkinLesion);
        assert_eq!(
            bits(&r),
            vec![
                0x3ddd_fc60,
                0x3dad_7d92,
                0x3d1e_ec29,
                0x3dc4_c130,
                0x3ce0_e54f,
                0x3f11_a7a3,
                0x3d9a_d862,
            ]
        );
    }

    #[test]
    fn empty_input_still_simulates() {
        let r = FallbackSimulator::new().simulate(&[], Domain::SkinLesion);
        assert!((r.sum() - 1.0).abs() < 1e-5);
    }
}
