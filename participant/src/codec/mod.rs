//! Parameter transport codec.
//!
//! Tensors are never sent whole. Each one is decomposed into its innermost one-dimensional
//! vectors, visited depth first with ascending indices, so that every transmission unit stays
//! under the channel's message-size ceiling. A `ChunkMap` records where each unit came from.

mod chunk_map;
mod error;
mod nested;

use machine_learning::Tensor;
use ndarray::{ArrayViewD, Axis, IxDyn};

pub use chunk_map::{ChunkEntry, ChunkMap};
pub use error::{CodecErr, Result};
pub use nested::{from_nested, reconstruct_whole, to_nested, to_nested_all};

/// A tensor list split into transmission units.
#[derive(Debug, Clone, PartialEq)]
pub struct Flattened {
    pub units: Vec<Vec<f32>>,
    pub map: ChunkMap,
}

/// Splits `tensors` into one-dimensional transmission units.
///
/// # Arguments
/// * `tensors` - The ordered parameter tensors.
///
/// # Returns
/// The units in transmission order and their chunk map, or an error if a tensor is a scalar,
/// holds a value JSON can't carry, or there is nothing to send at all.
pub fn flatten(tensors: &[Tensor]) -> Result<Flattened> {
    let mut out = Flattened {
        units: Vec::new(),
        map: ChunkMap::default(),
    };

    for (tensor, t) in tensors.iter().enumerate() {
        if t.ndim() == 0 {
            return Err(CodecErr::ScalarTensor { tensor });
        }

        ensure_finite(tensor, t)?;
        out.map.push_shape(t.shape());
        walk(t.view(), tensor, &mut Vec::new(), &mut out);
    }

    if out.map.is_empty() {
        return Err(CodecErr::Empty);
    }

    Ok(out)
}

/// NaN and the infinities have no JSON encoding.
fn ensure_finite(tensor: usize, t: &Tensor) -> Result<()> {
    if t.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(CodecErr::NonFinite { tensor })
    }
}

fn walk(view: ArrayViewD<'_, f32>, tensor: usize, position: &mut Vec<usize>, out: &mut Flattened) {
    if view.ndim() == 1 {
        let unit: Vec<f32> = view.iter().copied().collect();
        out.map.push_entry(ChunkEntry {
            tensor,
            position: position.clone(),
            len: unit.len(),
        });
        out.units.push(unit);
        return;
    }

    for (i, sub) in view.axis_iter(Axis(0)).enumerate() {
        position.push(i);
        walk(sub, tensor, position, out);
        position.pop();
    }
}

/// Rebuilds the original tensors from a complete, in-order set of units.
///
/// # Arguments
/// * `map` - The chunk map recorded when the tensors were flattened.
/// * `units` - The received units, in the order they arrived.
///
/// # Returns
/// The tensors in their original shapes and order, or an error if the units don't fit the map.
pub fn reconstruct(map: &ChunkMap, units: &[Vec<f32>]) -> Result<Vec<Tensor>> {
    if units.len() < map.len() {
        return Err(CodecErr::Incomplete {
            got: units.len(),
            expected: map.len(),
        });
    }

    if units.len() > map.len() {
        return Err(CodecErr::Overflow { expected: map.len() });
    }

    let mut tensors: Vec<Tensor> = map
        .shapes()
        .iter()
        .map(|shape| Tensor::zeros(IxDyn(shape)))
        .collect();

    for (unit, (entry, values)) in map.entries().iter().zip(units).enumerate() {
        let tensor = tensors
            .get_mut(entry.tensor)
            .ok_or(CodecErr::InvalidPosition { unit })?;

        let mut view = tensor.view_mut();
        for &idx in &entry.position {
            if view.ndim() < 2 || idx >= view.len_of(Axis(0)) {
                return Err(CodecErr::InvalidPosition { unit });
            }
            view = view.index_axis_move(Axis(0), idx);
        }

        if view.ndim() != 1 {
            return Err(CodecErr::InvalidPosition { unit });
        }

        if view.len() != values.len() {
            return Err(CodecErr::UnitLengthMismatch {
                unit,
                got: values.len(),
                expected: view.len(),
            });
        }

        view.iter_mut().zip(values).for_each(|(dst, &src)| *dst = src);
    }

    Ok(tensors)
}

/// Collects aggregated units one at a time for a single round.
#[derive(Debug, Clone, Default)]
pub struct Reassembler {
    map: ChunkMap,
    units: Vec<Vec<f32>>,
}

impl Reassembler {
    /// Creates a new `Reassembler` expecting the units described by `map`.
    pub fn new(map: ChunkMap) -> Self {
        Self {
            units: Vec::with_capacity(map.len()),
            map,
        }
    }

    /// Accepts the next unit, checking it has the length its chunk map entry expects.
    ///
    /// # Arguments
    /// * `values` - The unit's values.
    pub fn push(&mut self, values: Vec<f32>) -> Result<()> {
        let unit = self.units.len();
        let entry = self
            .map
            .get(unit)
            .ok_or(CodecErr::Overflow { expected: self.map.len() })?;

        if entry.len != values.len() {
            return Err(CodecErr::UnitLengthMismatch {
                unit,
                got: values.len(),
                expected: entry.len,
            });
        }

        self.units.push(values);
        Ok(())
    }

    /// The amount of units collected so far.
    pub fn received(&self) -> usize {
        self.units.len()
    }

    pub fn is_complete(&self) -> bool {
        self.units.len() == self.map.len()
    }

    /// Rebuilds the tensors, failing if any unit is still missing.
    pub fn finish(self) -> Result<Vec<Tensor>> {
        reconstruct(&self.map, &self.units)
    }
}
