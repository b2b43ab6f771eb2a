use crate::common::*;
use tch::vision;

/// Resizing helpers on `(channels, height, width)` image tensors.
pub trait TensorExt {
    /// Resizes to exactly the given size, ignoring the aspect ratio.
    fn resize2d_exact(&self, new_height: i64, new_width: i64) -> Result<Tensor>;

    /// Resizes while preserving the aspect ratio and pads the borders with zeros.
    fn resize2d_letterbox(&self, new_height: i64, new_width: i64) -> Result<Tensor>;
}

impl TensorExt for Tensor {
    fn resize2d_exact(&self, new_height: i64, new_width: i64) -> Result<Tensor> {
        tch::no_grad(|| match (self.kind(), self.size().as_slice()) {
            (Kind::Uint8, &[_n_channels, _height, _width]) => {
                let resized = vision::image::resize(self, new_width, new_height)?;
                Ok(resized)
            }
            (Kind::Float, &[_n_channels, _height, _width]) => {
                let resized = vision::image::resize(
                    &(self * 255.0).to_kind(Kind::Uint8),
                    new_width,
                    new_height,
                )?
                .to_kind(Kind::Float)
                    / 255.0;
                Ok(resized)
            }
            (_, &[_n_channels, _height, _width]) => bail!("unsupported data kind"),
            _ => bail!("invalid shape: expect three dimensions"),
        })
    }

    fn resize2d_letterbox(&self, new_height: i64, new_width: i64) -> Result<Tensor> {
        let (channels, height, width) = self.size3()?;
        ensure!(
            self.kind() == Kind::Uint8,
            "unsupported data kind {:?}",
            self.kind()
        );

        let scale_h = new_height as f64 / height as f64;
        let scale_w = new_width as f64 / width as f64;
        let (inner_h, inner_w) = if scale_h <= scale_w {
            (new_height, (width as f64 * scale_h) as i64)
        } else {
            ((height as f64 * scale_w) as i64, new_width)
        };
        let (top, left) = ((new_height - inner_h) / 2, (new_width - inner_w) / 2);

        tch::no_grad(|| {
            let inner = vision::image::resize(self, inner_w, inner_h)?;
            let outer = Tensor::zeros(&[channels, new_height, new_width], (Kind::Uint8, self.device()));
            outer
                .narrow(1, top, inner_h)
                .narrow(2, left, inner_w)
                .copy_(&inner);
            Ok(outer)
        })
    }
}
