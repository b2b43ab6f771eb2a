use crate::{common::*, utils::TensorExt as _};
use tch::vision;

/// Decodes images by identifier.
pub trait ImageLoader
where
    Self: Debug + Send + Sync,
{
    /// Loads the image as a float tensor of shape `(net_h, net_w, 3)` with
    /// pixel values in `[0, 255]`.
    fn load(&self, image: &str, net_h: i64, net_w: i64) -> Result<Tensor>;
}

/// The method to fit an image into the network input size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResizeMode {
    /// Stretch to the input size.
    Interpolate,
    /// Keep the aspect ratio and pad with zeros.
    Letterbox,
}

impl Default for ResizeMode {
    fn default() -> Self {
        Self::Interpolate
    }
}

/// Loads image files relative to an image directory.
#[derive(Debug, Clone)]
pub struct FileImageLoader {
    image_dir: PathBuf,
    resize_mode: ResizeMode,
    resized_images: bool,
}

impl FileImageLoader {
    /// Creates a loader.
    ///
    /// * `image_dir` - The directory image identifiers are resolved against.
    /// * `resize_mode` - How images are fit into the input size.
    /// * `resized_images` - If set, images are expected to be stored at the
    ///   input size and are not resized.
    pub fn new(image_dir: impl AsRef<Path>, resize_mode: ResizeMode, resized_images: bool) -> Self {
        Self {
            image_dir: image_dir.as_ref().to_owned(),
            resize_mode,
            resized_images,
        }
    }
}

impl ImageLoader for FileImageLoader {
    fn load(&self, image: &str, net_h: i64, net_w: i64) -> Result<Tensor> {
        let path = self.image_dir.join(image);
        ensure!(
            path.is_file(),
            "the image file '{}' does not exist",
            path.display()
        );

        tch::no_grad(|| {
            let decoded = vision::image::load(&path)
                .with_context(|| format!("failed to load image file '{}'", path.display()))?;
            let (channels, height, width) = decoded.size3()?;
            ensure!(
                channels == 3,
                "expect 3 channels in '{}', but get {}",
                path.display(),
                channels
            );

            let resized = if self.resized_images {
                ensure!(
                    (height, width) == (net_h, net_w),
                    "the image '{}' has size {}x{}, but {}x{} is expected",
                    path.display(),
                    height,
                    width,
                    net_h,
                    net_w
                );
                decoded
            } else {
                match self.resize_mode {
                    ResizeMode::Interpolate => decoded.resize2d_exact(net_h, net_w)?,
                    ResizeMode::Letterbox => decoded.resize2d_letterbox(net_h, net_w)?,
                }
            };

            Ok(resized.permute(&[1, 2, 0]).to_kind(Kind::Float))
        })
    }
}
