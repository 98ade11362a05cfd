//! Dimension normalization for model output.
//!
//! A vector already at the target length passes through untouched. Any other
//! non-empty vector is block-averaged to the target length and L2-normalized.

/// Resize `vector` to `target` components.
///
/// Component `i` of the output averages source indices
/// `[i*n/target, max((i+1)*n/target, i*n/target + 1))`, which splits a longer
/// source into `target` contiguous blocks and stretches a shorter one.
pub fn resize(vector: Vec<f32>, target: usize) -> Vec<f32> {
    let n = vector.len();
    if n == target || n == 0 || target == 0 {
        return vector;
    }

    let blocks: Vec<f32> = (0..target)
        .map(|i| {
            let start = i * n / target;
            let end = ((i + 1) * n / target).max(start + 1).min(n);
            let block = &vector[start..end];
            block.iter().sum::<f32>() / block.len() as f32
        })
        .collect();

    l2_normalize(&blocks)
}

/// L2-normalize a vector. Returns the input unchanged if its norm is zero.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn test_l2_normalize() {
        let normalized = l2_normalize(&[3.0, 4.0]);
        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);
        assert!((norm(&normalized) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        assert_eq!(l2_normalize(&[0.0, 0.0, 0.0]), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn matching_length_is_untouched() {
        let v = vec![2.0, -7.0, 0.5];
        assert_eq!(resize(v.clone(), 3), v);
    }

    #[test]
    fn downsamples_by_block_average() {
        // blocks [1,3] and [5,7] average to 2 and 6
        let out = resize(vec![1.0, 3.0, 5.0, 7.0], 2);
        let expected = l2_normalize(&[2.0, 6.0]);
        assert_eq!(out.len(), 2);
        for (a, b) in out.iter().zip(&expected) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn uneven_blocks_cover_every_component() {
        let source: Vec<f32> = (1..=10).map(|x| x as f32).collect();
        let out = resize(source, 3);
        assert_eq!(out.len(), 3);
        assert!((norm(&out) - 1.0).abs() < 1e-5);
        assert!(out[0] < out[1] && out[1] < out[2]);
    }

    #[test]
    fn upsamples_shorter_vectors() {
        let out = resize(vec![1.0, -1.0], 5);
        assert_eq!(out.len(), 5);
        assert!((norm(&out) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn resized_output_is_unit_norm_for_many_lengths() {
        for n in [1usize, 2, 7, 383, 385, 768, 1536] {
            let source: Vec<f32> = (0..n).map(|i| ((i * 31 % 17) as f32) - 8.0 + 0.25).collect();
            let out = resize(source, 384);
            assert_eq!(out.len(), 384, "length for n={n}");
            if n != 384 {
                assert!((norm(&out) - 1.0).abs() < 1e-4, "norm for n={n}");
            }
        }
    }
}
