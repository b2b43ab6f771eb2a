use crate::common::*;

/// A normalization applied to a single `(height, width, 3)` float image.
pub type NormFn = Arc<dyn Fn(&Tensor) -> Tensor + Send + Sync>;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Scales pixel values from `[0, 255]` to `[0, 1]` and standardizes each
/// channel with ImageNet statistics.
pub fn imagenet_normalize(image: &Tensor) -> Tensor {
    let device = image.device();
    let mean = Tensor::of_slice(&IMAGENET_MEAN).to_device(device);
    let std = Tensor::of_slice(&IMAGENET_STD).to_device(device);
    (image.to_kind(Kind::Float) / 255.0 - mean) / std
}

pub fn imagenet_norm_fn() -> NormFn {
    Arc::new(imagenet_normalize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imagenet_normalize_test() {
        let image = Tensor::full(&[2, 2, 3], 255.0, (Kind::Float, Device::Cpu));
        let normalized = imagenet_normalize(&image);
        assert_eq!(normalized.size(), vec![2, 2, 3]);

        let values = Vec::<f32>::from(&normalized.i((0, 0)));
        izip!(values, IMAGENET_MEAN, IMAGENET_STD).for_each(|(value, mean, std)| {
            approx::assert_abs_diff_eq!(value, (1.0 - mean) / std, epsilon = 1e-5);
        });
    }
}
