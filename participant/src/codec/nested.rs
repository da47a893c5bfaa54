use comms::msg::NestedArray;
use machine_learning::Tensor;
use ndarray::{ArrayViewD, Axis, IxDyn};

use super::{CodecErr, Result, ensure_finite};

/// Converts a tensor into the nested list form used by whole-parameter transfers.
pub fn to_nested(tensor: &Tensor) -> NestedArray {
    fn walk(view: ArrayViewD<'_, f32>) -> NestedArray {
        if view.ndim() == 0 {
            return NestedArray::Scalar(view.iter().next().copied().unwrap_or_default());
        }

        NestedArray::List(view.axis_iter(Axis(0)).map(walk).collect())
    }

    walk(tensor.view())
}

/// Converts every tensor of a whole-parameter transfer, refusing values JSON can't carry.
pub fn to_nested_all(tensors: &[Tensor]) -> Result<Vec<NestedArray>> {
    tensors
        .iter()
        .enumerate()
        .map(|(i, t)| ensure_finite(i, t).map(|_| to_nested(t)))
        .collect()
}

/// Converts a nested list back into a tensor, inferring its shape.
///
/// # Returns
/// The tensor, or `CodecErr::RaggedArray` if the nesting is not rectangular.
pub fn from_nested(nested: &NestedArray) -> Result<Tensor> {
    let mut shape = Vec::new();
    let mut cursor = nested;

    while let NestedArray::List(items) = cursor {
        shape.push(items.len());
        match items.first() {
            Some(first) => cursor = first,
            None => break,
        }
    }

    let mut values = Vec::with_capacity(shape.iter().product());
    collect(nested, &shape, &mut values)?;

    Tensor::from_shape_vec(IxDyn(&shape), values).map_err(|_| CodecErr::RaggedArray)
}

fn collect(nested: &NestedArray, shape: &[usize], out: &mut Vec<f32>) -> Result<()> {
    match (nested, shape.split_first()) {
        (NestedArray::Scalar(v), None) => {
            out.push(*v);
            Ok(())
        }
        (NestedArray::List(items), Some((&len, rest))) if items.len() == len => {
            items.iter().try_for_each(|item| collect(item, rest, out))
        }
        _ => Err(CodecErr::RaggedArray),
    }
}

/// Rebuilds a whole-parameter transfer, checking every tensor against the shape that was sent.
///
/// # Arguments
/// * `nested` - The received tensors in nested list form.
/// * `shapes` - The shapes of the tensors that were sent this round.
pub fn reconstruct_whole(nested: &[NestedArray], shapes: &[Vec<usize>]) -> Result<Vec<Tensor>> {
    if nested.len() != shapes.len() {
        return Err(CodecErr::TensorCountMismatch {
            got: nested.len(),
            expected: shapes.len(),
        });
    }

    nested
        .iter()
        .zip(shapes)
        .enumerate()
        .map(|(tensor, (n, expected))| {
            let t = from_nested(n)?;
            if t.shape() == expected.as_slice() {
                return Ok(t);
            }

            // An empty list carries no shape below its first axis.
            if t.is_empty() && expected.iter().product::<usize>() == 0 {
                return Ok(Tensor::zeros(IxDyn(expected)));
            }

            Err(CodecErr::ShapeMismatch {
                tensor,
                got: t.shape().to_vec(),
                expected: expected.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use ndarray::ArrayD;

    use super::*;

    fn scalar(v: f32) -> NestedArray {
        NestedArray::Scalar(v)
    }

    #[test]
    fn matrix_becomes_list_of_rows() {
        let t = ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![1.0, 2.0, 3.0, 4.0]).unwrap();

        assert_eq!(
            to_nested(&t),
            NestedArray::List(vec![
                NestedArray::List(vec![scalar(1.0), scalar(2.0)]),
                NestedArray::List(vec![scalar(3.0), scalar(4.0)]),
            ])
        );
    }

    #[test]
    fn nested_round_trip_keeps_shape() {
        let values = (0..24).map(|v| v as f32).collect();
        let t = ArrayD::from_shape_vec(IxDyn(&[2, 3, 4]), values).unwrap();

        assert_eq!(from_nested(&to_nested(&t)).unwrap(), t);
    }

    #[test]
    fn infinite_values_are_not_nested() {
        let ok = ArrayD::from_elem(IxDyn(&[2]), 1.0);
        let bad = ArrayD::from_shape_vec(IxDyn(&[2]), vec![1.0, f32::NEG_INFINITY]).unwrap();

        assert_eq!(to_nested_all(&[ok.clone()]).unwrap(), vec![to_nested(&ok)]);
        assert_eq!(
            to_nested_all(&[ok, bad]).unwrap_err(),
            CodecErr::NonFinite { tensor: 1 }
        );
    }

    #[test]
    fn scalars_round_trip() {
        let t = ArrayD::from_elem(IxDyn(&[]), 2.5);
        assert_eq!(to_nested(&t), scalar(2.5));
        assert_eq!(from_nested(&scalar(2.5)).unwrap(), t);
    }

    #[test]
    fn ragged_lists_are_rejected() {
        let ragged = NestedArray::List(vec![
            NestedArray::List(vec![scalar(1.0), scalar(2.0)]),
            NestedArray::List(vec![scalar(3.0)]),
        ]);
        assert_eq!(from_nested(&ragged).unwrap_err(), CodecErr::RaggedArray);

        let mixed = NestedArray::List(vec![
            NestedArray::List(vec![scalar(1.0)]),
            scalar(2.0),
        ]);
        assert_eq!(from_nested(&mixed).unwrap_err(), CodecErr::RaggedArray);
    }

    #[test]
    fn whole_transfer_checks_shapes() {
        let sent = vec![vec![2, 2], vec![1]];
        let received = vec![
            NestedArray::List(vec![
                NestedArray::List(vec![scalar(1.0), scalar(2.0)]),
                NestedArray::List(vec![scalar(3.0), scalar(4.0)]),
            ]),
            NestedArray::List(vec![scalar(5.0)]),
        ];

        let tensors = reconstruct_whole(&received, &sent).unwrap();
        assert_eq!(tensors[0].shape(), &[2, 2]);
        assert_eq!(tensors[1].shape(), &[1]);

        assert_eq!(
            reconstruct_whole(&received[..1], &sent).unwrap_err(),
            CodecErr::TensorCountMismatch {
                got: 1,
                expected: 2
            }
        );

        let swapped = vec![sent[1].clone(), sent[0].clone()];
        assert!(matches!(
            reconstruct_whole(&received, &swapped),
            Err(CodecErr::ShapeMismatch { tensor: 0, .. })
        ));
    }

    #[test]
    fn empty_tensors_take_the_sent_shape() {
        let sent = vec![vec![0, 3]];
        let received = vec![NestedArray::List(vec![])];

        let tensors = reconstruct_whole(&received, &sent).unwrap();
        assert_eq!(tensors[0].shape(), &[0, 3]);
    }
}
