use ndarray::{ArrayViewD, ArrayViewMutD};

/// An update rule that moves a parameter tensor against its gradient.
pub trait Optimizer {
    fn update_params(&mut self, params: ArrayViewMutD<'_, f32>, grad: ArrayViewD<'_, f32>);
}
