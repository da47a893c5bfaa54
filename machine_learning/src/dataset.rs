use ndarray::{Array1, Array2, ArrayView2};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::{MlErr, Result};

/// A labelled classification dataset held in memory.
#[derive(Debug, Clone)]
pub struct Dataset {
    x: Array2<f32>,
    labels: Array1<usize>,
    classes: usize,
}

impl Dataset {
    /// Creates a new `Dataset`.
    ///
    /// # Arguments
    /// * `x` - The samples, one per row.
    /// * `labels` - The class of each sample.
    /// * `classes` - The amount of distinct classes.
    ///
    /// # Returns
    /// A new `Dataset` or an error if the sizes are inconsistent.
    pub fn new(x: Array2<f32>, labels: Array1<usize>, classes: usize) -> Result<Self> {
        if x.nrows() != labels.len() {
            return Err(MlErr::SizeMismatch {
                what: "dataset labels",
                got: labels.len(),
                expected: x.nrows(),
            });
        }

        if let Some(&label) = labels.iter().find(|&&label| label >= classes) {
            return Err(MlErr::SizeMismatch {
                what: "dataset classes",
                got: label + 1,
                expected: classes,
            });
        }

        Ok(Self { x, labels, classes })
    }

    /// Generates one gaussian cluster per class, each centered on its own random point.
    ///
    /// # Arguments
    /// * `per_class` - The amount of samples drawn for each class.
    /// * `features` - The dimensionality of each sample.
    /// * `classes` - The amount of classes.
    /// * `spread` - The standard deviation of every cluster.
    /// * `rng` - The source of randomness.
    pub fn blobs<R: Rng>(
        per_class: usize,
        features: usize,
        classes: usize,
        spread: f32,
        rng: &mut R,
    ) -> Result<Self> {
        let noise = Normal::new(0.0, spread).map_err(|_| MlErr::InvalidHyperparameter {
            name: "spread",
            reason: "must be finite and non negative",
        })?;

        let centers: Array2<f32> =
            Array2::from_shape_fn((classes, features), |_| rng.random_range(-4.0..4.0));
        let len = per_class * classes;

        let labels = Array1::from_shape_fn(len, |i| i % classes);
        let x = Array2::from_shape_fn((len, features), |(i, j)| {
            centers[[labels[i], j]] + noise.sample(&mut *rng)
        });

        Self::new(x, labels, classes)
    }

    pub fn x(&self) -> ArrayView2<'_, f32> {
        self.x.view()
    }

    pub fn labels(&self) -> &Array1<usize> {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn features(&self) -> usize {
        self.x.ncols()
    }

    pub fn classes(&self) -> usize {
        self.classes
    }
}
