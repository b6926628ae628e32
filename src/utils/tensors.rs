use burn::tensor::{backend::Backend, Data, ElementConversion, Int, Shape, Tensor};

/// Build a padded 2D Int tensor from variable-length id sequences, padding
/// every row to `seq_length` with `pad_token`
pub fn pad_to<B: Backend>(
    pad_token: usize,
    tokens_list: Vec<Vec<usize>>,
    seq_length: usize,
    device: &B::Device,
) -> Tensor<B, 2, Int> {
    let batch_size = tokens_list.len();

    let mut tensor = Tensor::zeros([batch_size, seq_length], device);
    tensor = tensor.add_scalar(pad_token as i64);

    for (index, tokens) in tokens_list.into_iter().enumerate() {
        let seq_length = tokens.len();

        if seq_length == 0 {
            continue;
        }

        tensor = tensor.slice_assign(
            [index..index + 1, 0..seq_length],
            Tensor::from_data(
                Data::new(
                    tokens.into_iter().map(|e| (e as i64).elem()).collect(),
                    Shape::new([1, seq_length]),
                ),
                device,
            ),
        );
    }

    tensor
}

/// A float mask of shape [batch, seq_length] with 1.0 at positions below each
/// sequence's true length and 0.0 in the pad region
pub fn sequence_mask<B: Backend>(
    lengths: &[usize],
    seq_length: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    let batch_size = lengths.len();
    let mut values = Vec::with_capacity(batch_size * seq_length);

    for &len in lengths {
        for t in 0..seq_length {
            values.push(if t < len { 1.0f32.elem() } else { 0.0f32.elem() });
        }
    }

    Tensor::from_data(
        Data::new(values, Shape::new([batch_size, seq_length])),
        device,
    )
}

/// Reverse the valid prefix of each row of a [rows, time, features] tensor,
/// leaving pad positions where they are. Feeding the result to a forward
/// recurrent layer yields a length-aware backward pass: pad steps come after
/// every valid step and can never influence them.
pub fn reverse_padded<B: Backend>(tensor: Tensor<B, 3>, lengths: &[usize]) -> Tensor<B, 3> {
    let [rows, time, features] = tensor.dims();
    let device = tensor.device();

    let mut values = Vec::with_capacity(rows * time);
    for &len in lengths {
        for t in 0..time {
            let source = if t < len { len - 1 - t } else { t };
            values.push((source as i64).elem());
        }
    }

    let indices: Tensor<B, 2, Int> =
        Tensor::from_data(Data::new(values, Shape::new([rows, time])), &device);
    let indices = indices.unsqueeze_dim::<3>(2).repeat(2, features);

    tensor.gather(1, indices)
}

/// Select the hidden state at each row's last valid time step from a
/// [rows, time, features] tensor, producing [rows, features]. Rows with a
/// zero length fall back to position 0.
pub fn gather_last<B: Backend>(tensor: Tensor<B, 3>, lengths: &[usize]) -> Tensor<B, 2> {
    let [rows, _time, features] = tensor.dims();
    let device = tensor.device();

    let values = lengths
        .iter()
        .map(|&len| (len.max(1) as i64 - 1).elem())
        .collect();

    let indices: Tensor<B, 2, Int> =
        Tensor::from_data(Data::new(values, Shape::new([rows, 1])), &device);
    let indices = indices.unsqueeze_dim::<3>(2).repeat(2, features);

    tensor.gather(1, indices).squeeze::<2>(1)
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use pretty_assertions::assert_eq;

    use super::*;

    type B = NdArray;

    fn device() -> <B as Backend>::Device {
        Default::default()
    }

    #[test]
    fn pad_to_fills_short_rows_with_the_pad_token() {
        let grid = pad_to::<B>(0, vec![vec![3, 4, 5], vec![7]], 4, &device());

        let values: Vec<i64> = grid.into_data().convert::<i64>().value;
        assert_eq!(values, vec![3, 4, 5, 0, 7, 0, 0, 0]);
    }

    #[test]
    fn sequence_mask_marks_valid_positions() {
        let mask = sequence_mask::<B>(&[2, 3], 3, &device());

        let values: Vec<f32> = mask.into_data().convert::<f32>().value;
        assert_eq!(values, vec![1.0, 1.0, 0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn reverse_padded_flips_only_the_valid_prefix() {
        let input: Tensor<B, 3> = Tensor::from_data(
            Data::new(
                vec![1.0, 2.0, 3.0, 9.0, 4.0, 5.0, 0.0, 0.0],
                Shape::new([2, 4, 1]),
            ),
            &device(),
        );

        let reversed = reverse_padded(input, &[3, 2]);

        let values: Vec<f32> = reversed.into_data().convert::<f32>().value;
        assert_eq!(values, vec![3.0, 2.0, 1.0, 9.0, 5.0, 4.0, 0.0, 0.0]);
    }

    #[test]
    fn gather_last_picks_the_state_at_the_true_length() {
        let input: Tensor<B, 3> = Tensor::from_data(
            Data::new(
                vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0],
                Shape::new([2, 2, 2]),
            ),
            &device(),
        );

        let last = gather_last(input, &[2, 1]);

        let values: Vec<f32> = last.into_data().convert::<f32>().value;
        assert_eq!(values, vec![3.0, 4.0, 5.0, 6.0]);
    }
}
