//! Feature map shapes and the spatial rules of each layer type.

use serde::{Deserialize, Serialize};

/// Shape of a single feature map, batch dimension excluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl FeatureShape {
    pub fn new(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
        }
    }

    /// Same resolution, different channel count
    pub fn with_channels(self, channels: usize) -> Self {
        Self { channels, ..self }
    }

    pub fn resolution(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Number of scalar activations in the map
    pub fn num_elements(&self) -> usize {
        self.channels * self.height * self.width
    }
}

impl std::fmt::Display for FeatureShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(None, {}, {}, {})", self.channels, self.height, self.width)
    }
}

/// Output size of a convolution along one axis.
///
/// Returns `None` when the padded input is smaller than the kernel.
pub fn conv_output_size(
    input: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
) -> Option<usize> {
    let padded = input + 2 * padding;
    if stride == 0 || padded < kernel {
        return None;
    }
    Some((padded - kernel) / stride + 1)
}

/// Padding that keeps the size unchanged for a stride-1 convolution with an odd kernel
pub fn same_padding(kernel: usize) -> usize {
    kernel / 2
}

/// Output size of an unpadded max pool along one axis
pub fn pool_output_size(input: usize, pool: usize, stride: usize) -> Option<usize> {
    conv_output_size(input, pool, stride, 0)
}

/// Output size of a transposed convolution along one axis
pub fn conv_transpose_output_size(
    input: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
    padding_out: usize,
) -> Option<usize> {
    if input == 0 {
        return None;
    }
    ((input - 1) * stride + kernel + padding_out).checked_sub(2 * padding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_conv_keeps_size() {
        assert_eq!(conv_output_size(224, 3, 1, same_padding(3)), Some(224));
        assert_eq!(conv_output_size(7, 1, 1, same_padding(1)), Some(7));
    }

    #[test]
    fn test_pool_halves_even_sizes() {
        assert_eq!(pool_output_size(224, 2, 2), Some(112));
        assert_eq!(pool_output_size(14, 2, 2), Some(7));
        // Odd sizes lose a row
        assert_eq!(pool_output_size(7, 2, 2), Some(3));
        assert_eq!(pool_output_size(1, 2, 2), None);
    }

    #[test]
    fn test_transposed_conv_doubles() {
        for size in [1, 7, 14, 28, 56, 112] {
            assert_eq!(conv_transpose_output_size(size, 3, 2, 1, 1), Some(2 * size));
        }
        assert_eq!(conv_transpose_output_size(0, 3, 2, 1, 1), None);
    }

    #[test]
    fn test_feature_shape_display() {
        let shape = FeatureShape::new(48, 224, 224);
        assert_eq!(shape.to_string(), "(None, 48, 224, 224)");
        assert_eq!(shape.with_channels(112).channels, 112);
        assert_eq!(shape.num_elements(), 48 * 224 * 224);
    }
}
