use crate::common::*;

/// One sample: an image identifier and its per-patch label channels.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceRecord {
    /// The image identifier, resolved to a file by an image loader.
    pub image: String,
    /// Label grids in channel-first order, shape `(channels, box_size, box_size)`.
    pub labels: Array3<f32>,
}

impl InstanceRecord {
    pub fn new(image: impl Into<String>, labels: Array3<f32>) -> Result<Self> {
        let (channels, box_h, box_w) = labels.dim();
        ensure!(channels > 0, "a record must have at least one label channel");
        ensure!(
            box_h == box_w && box_h > 0,
            "label grids must be square and non-empty, but get {}x{}",
            box_h,
            box_w
        );

        Ok(Self {
            image: image.into(),
            labels,
        })
    }

    pub fn num_channels(&self) -> usize {
        self.labels.len_of(Axis(0))
    }

    pub fn box_size(&self) -> usize {
        self.labels.len_of(Axis(1))
    }

    /// Label values permuted to `(box_size, box_size, channels)` in row-major order.
    pub fn channel_last(&self) -> Array3<f32> {
        self.labels
            .view()
            .permuted_axes([1, 2, 0])
            .as_standard_layout()
            .into_owned()
    }

    /// Returns true if any cell in the channel is positive.
    pub fn has_positive(&self, channel: usize) -> bool {
        self.labels
            .index_axis(Axis(0), channel)
            .iter()
            .any(|&value| value > 0.0)
    }
}
