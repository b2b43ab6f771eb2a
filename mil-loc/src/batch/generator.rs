use crate::{
    common::*,
    dataset::{InstanceRecord, InstanceTable},
    processor::{ImageLoader, NormFn},
};

/// A pair of image and label tensors.
#[derive(Debug)]
pub struct Batch {
    /// Images in shape `(batch_size, net_h, net_w, 3)`.
    pub images: Tensor,
    /// Labels in shape `(batch_size, box_size, box_size, num_channels)`.
    pub labels: Tensor,
}

/// Batch generator options.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct BatchGeneratorInit {
    pub batch_size: usize,
    /// Shuffle the instances at construction and at every epoch end.
    pub shuffle: bool,
    /// The shuffling seed. The generator is seeded from entropy if not set.
    pub seed: Option<u64>,
    #[derivative(Debug = "ignore")]
    pub norm: Option<NormFn>,
    pub net_h: usize,
    pub net_w: usize,
    pub box_size: usize,
}

impl BatchGeneratorInit {
    /// Builds a generator that takes exclusive ownership of the instances.
    pub fn build(
        self,
        instances: InstanceTable,
        loader: Arc<dyn ImageLoader>,
    ) -> Result<BatchGenerator> {
        let Self {
            batch_size,
            shuffle,
            seed,
            norm,
            net_h,
            net_w,
            box_size,
        } = self;

        ensure!(batch_size > 0, "batch_size must be positive");
        ensure!(net_h > 0 && net_w > 0, "net_h and net_w must be positive");
        ensure!(box_size > 0, "box_size must be positive");

        let num_channels = instances.num_channels();
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut instances = instances.into_records();

        if shuffle {
            instances.shuffle(&mut rng);
        }

        Ok(BatchGenerator {
            instances,
            num_channels,
            batch_size,
            shuffle,
            norm,
            net_h,
            net_w,
            box_size,
            loader,
            rng,
        })
    }
}

/// Presents an instance table as an indexable sequence of fixed-size batches.
///
/// Every batch has exactly `batch_size` rows. The last batch is anchored to the
/// end of the instance list, so it overlaps the previous batch when the number
/// of instances is not a multiple of the batch size.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct BatchGenerator {
    instances: Vec<InstanceRecord>,
    num_channels: usize,
    batch_size: usize,
    shuffle: bool,
    #[derivative(Debug = "ignore")]
    norm: Option<NormFn>,
    net_h: usize,
    net_w: usize,
    box_size: usize,
    loader: Arc<dyn ImageLoader>,
    rng: StdRng,
}

impl BatchGenerator {
    /// The number of addressable batches, `ceil(size / batch_size)`.
    pub fn length(&self) -> usize {
        let num_instances = self.instances.len();
        num_instances / self.batch_size + usize::from(num_instances % self.batch_size != 0)
    }

    /// The number of instances.
    pub fn size(&self) -> usize {
        self.instances.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// The instances in their current order.
    pub fn instances(&self) -> &[InstanceRecord] {
        &self.instances
    }

    /// The instance index range covered by the batch at `index`.
    pub fn batch_range(&self, index: usize) -> Result<Range<usize>> {
        let num_instances = self.instances.len();
        let batch_size = self.batch_size;
        ensure!(
            index < self.length(),
            "batch index {} is out of range, the generator has {} batches",
            index,
            self.length()
        );

        let mut lower = index * batch_size;
        let mut upper = lower.saturating_add(batch_size);

        if upper > num_instances {
            upper = num_instances;
            lower = upper.checked_sub(batch_size).ok_or_else(|| {
                format_err!(
                    "batch_size {} exceeds the number of instances {}",
                    batch_size,
                    num_instances
                )
            })?;
        }

        Ok(lower..upper)
    }

    /// Loads the batch at `index`.
    pub fn get_batch(&self, index: usize) -> Result<Batch> {
        let range = self.batch_range(index)?;
        let records = &self.instances[range];
        let net_h = self.net_h as i64;
        let net_w = self.net_w as i64;
        let box_size = self.box_size;
        let num_channels = self.num_channels;

        let images: Vec<Tensor> = records
            .iter()
            .map(|record| -> Result<_> {
                let image = self.loader.load(&record.image, net_h, net_w)?;
                ensure!(
                    image.size() == [net_h, net_w, 3],
                    "the image loader returns shape {:?} for '{}', but ({}, {}, 3) is expected",
                    image.size(),
                    record.image,
                    net_h,
                    net_w
                );
                let image = match &self.norm {
                    Some(norm) => norm(&image),
                    None => image,
                };
                Ok(image)
            })
            .try_collect()?;

        let labels: Vec<f32> = records
            .iter()
            .map(|record| -> Result<_> {
                let expect = (num_channels, box_size, box_size);
                ensure!(
                    record.labels.dim() == expect,
                    "record '{}' has label shape {:?}, but {:?} is expected",
                    record.image,
                    record.labels.dim(),
                    expect
                );
                Ok(record.channel_last().into_raw_vec())
            })
            .flatten_ok()
            .try_collect()?;

        let images = Tensor::stack(images.as_slice(), 0).to_kind(Kind::Float);
        let labels = Tensor::of_slice(&labels).view([
            records.len() as i64,
            box_size as i64,
            box_size as i64,
            num_channels as i64,
        ]);

        Ok(Batch { images, labels })
    }

    /// Reshuffles the instances if shuffling is enabled.
    pub fn on_epoch_end(&mut self) {
        if self.shuffle {
            self.instances.shuffle(&mut self.rng);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Produces images filled with the numeric image identifier.
    #[derive(Debug)]
    struct IndexImageLoader;

    impl ImageLoader for IndexImageLoader {
        fn load(&self, image: &str, net_h: i64, net_w: i64) -> Result<Tensor> {
            let value: f64 = image.parse()?;
            Ok(Tensor::full(&[net_h, net_w, 3], value, (Kind::Float, Device::Cpu)))
        }
    }

    /// Builds a table whose record `i` has image `"i"` and channel `c` filled with `i * 10 + c`.
    fn make_table(len: usize, num_channels: usize, box_size: usize) -> InstanceTable {
        let channels: Vec<_> = (0..num_channels).map(|c| format!("class{}", c)).collect();
        let records = (0..len).map(|index| {
            let labels = Array3::from_shape_fn((num_channels, box_size, box_size), |(c, _, _)| {
                (index * 10 + c) as f32
            });
            InstanceRecord::new(index.to_string(), labels).unwrap()
        });
        InstanceTable::from_records(channels, box_size, records).unwrap()
    }

    fn make_generator(table: InstanceTable, batch_size: usize, shuffle: bool, seed: Option<u64>) -> BatchGenerator {
        BatchGeneratorInit {
            batch_size,
            shuffle,
            seed,
            norm: None,
            net_h: 4,
            net_w: 4,
            box_size: table.box_size(),
        }
        .build(table, Arc::new(IndexImageLoader))
        .unwrap()
    }

    fn batch_image_ids(batch: &Batch) -> Vec<i64> {
        let ids = batch.images.i((.., 0, 0, 0));
        Vec::<f32>::from(&ids).into_iter().map(|id| id as i64).collect()
    }

    #[test]
    fn length_test() {
        for (len, batch_size, expect) in [(23, 5, 5), (20, 5, 4), (1, 1, 1), (0, 3, 0), (7, 10, 1)] {
            let generator = make_generator(make_table(len, 1, 2), batch_size, false, None);
            assert_eq!(generator.length(), expect);
            assert_eq!(generator.size(), len);
        }
    }

    #[test]
    fn huge_batch_size_test() {
        let generator = make_generator(make_table(3, 1, 2), usize::MAX, false, None);
        assert_eq!(generator.length(), 1);
        assert!(generator.batch_range(0).is_err());
        assert!(generator.batch_range(1).is_err());
    }

    #[test]
    fn anchored_last_batch_test() {
        let generator = make_generator(make_table(23, 2, 2), 5, false, None);
        assert_eq!(generator.length(), 5);

        assert_eq!(generator.batch_range(3).unwrap(), 15..20);
        assert_eq!(generator.batch_range(4).unwrap(), 18..23);

        let batch = generator.get_batch(4).unwrap();
        assert_eq!(batch.images.size(), vec![5, 4, 4, 3]);
        assert_eq!(batch_image_ids(&batch), vec![18, 19, 20, 21, 22]);
    }

    #[test]
    fn contiguous_batches_test() {
        let len = 37;
        let batch_size = 6;
        let generator = make_generator(make_table(len, 1, 2), batch_size, false, None);
        let length = generator.length();

        let mut expect_lower = 0;
        for index in 0..length {
            let range = generator.batch_range(index).unwrap();
            assert_eq!(range.len(), batch_size);
            if index + 1 < length {
                assert_eq!(range, expect_lower..expect_lower + batch_size);
                expect_lower = range.end;
            } else {
                assert_eq!(range.end, len);
            }

            let batch = generator.get_batch(index).unwrap();
            assert_eq!(batch.images.size()[0], batch_size as i64);
            assert_eq!(batch.labels.size()[0], batch_size as i64);
        }
    }

    #[test]
    fn channel_last_labels_test() {
        let generator = make_generator(make_table(4, 3, 2), 2, false, None);
        let batch = generator.get_batch(1).unwrap();
        assert_eq!(batch.labels.size(), vec![2, 2, 2, 3]);

        // record 2, cell (1, 0), channels 0..3
        let values = Vec::<f32>::from(&batch.labels.i((0, 1, 0)));
        assert_eq!(values, vec![20.0, 21.0, 22.0]);
        // record 3, cell (0, 1), channel 2
        assert_eq!(f64::from(&batch.labels.i((1, 0, 1, 2))), 32.0);
    }

    #[test]
    fn normalization_test() {
        let table = make_table(2, 1, 2);
        let generator = BatchGeneratorInit {
            batch_size: 2,
            shuffle: false,
            seed: None,
            norm: Some(Arc::new(|image: &Tensor| image * 2.0)),
            net_h: 3,
            net_w: 5,
            box_size: 2,
        }
        .build(table, Arc::new(IndexImageLoader))
        .unwrap();

        let batch = generator.get_batch(0).unwrap();
        assert_eq!(batch.images.size(), vec![2, 3, 5, 3]);
        assert_eq!(batch_image_ids(&batch), vec![0, 2]);
    }

    #[test]
    fn unshuffled_generators_agree_test() {
        let lhs = make_generator(make_table(12, 1, 2), 5, false, None);
        let rhs = make_generator(make_table(12, 1, 2), 5, false, None);
        for index in 0..lhs.length() {
            let lhs = lhs.get_batch(index).unwrap();
            let rhs = rhs.get_batch(index).unwrap();
            assert!(lhs.images.equal(&rhs.images));
            assert!(lhs.labels.equal(&rhs.labels));
        }
    }

    #[test]
    fn seeded_shuffle_test() {
        let ids = |generator: &BatchGenerator| -> Vec<String> {
            generator.instances().iter().map(|record| record.image.clone()).collect()
        };

        let mut lhs = make_generator(make_table(50, 1, 2), 5, true, Some(42));
        let mut rhs = make_generator(make_table(50, 1, 2), 5, true, Some(42));
        assert_eq!(ids(&lhs), ids(&rhs));

        let ordered: Vec<String> = (0..50).map(|index| index.to_string()).collect();
        assert_ne!(ids(&lhs), ordered);

        let before = ids(&lhs);
        lhs.on_epoch_end();
        rhs.on_epoch_end();
        assert_eq!(ids(&lhs), ids(&rhs));
        assert_ne!(ids(&lhs), before);

        let mut sorted = ids(&lhs);
        sorted.sort_by_key(|id| id.parse::<usize>().unwrap());
        assert_eq!(sorted, ordered);
    }

    #[test]
    fn epoch_end_without_shuffle_test() {
        let mut generator = make_generator(make_table(10, 1, 2), 3, false, Some(1));
        let before = generator.instances().to_vec();
        generator.on_epoch_end();
        assert_eq!(generator.instances(), before.as_slice());
    }

    #[test]
    fn invalid_index_test() {
        let generator = make_generator(make_table(10, 1, 2), 3, false, None);
        assert!(generator.get_batch(4).is_err());
    }

    #[test]
    fn batch_size_exceeds_instances_test() {
        let generator = make_generator(make_table(3, 1, 2), 5, false, None);
        assert_eq!(generator.length(), 1);
        assert!(generator.get_batch(0).is_err());
    }

    #[test]
    fn mismatched_box_size_test() {
        let table = make_table(4, 1, 2);
        let generator = BatchGeneratorInit {
            batch_size: 2,
            shuffle: false,
            seed: None,
            norm: None,
            net_h: 4,
            net_w: 4,
            box_size: 3,
        }
        .build(table, Arc::new(IndexImageLoader))
        .unwrap();
        assert!(generator.get_batch(0).is_err());
    }
}
