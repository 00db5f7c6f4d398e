use crate::types::{ClassLabel, LabelImage, LabelImageView};
use ndarray::{ArrayView2, ArrayViewMut2, Axis};

/// Run a per-pixel fusion function over row blocks of the output image.
///
/// Each block gets its own worker state from `init`, reused for every pixel
/// of the block. Pixels whose mask value is zero receive `masked_label`
/// without calling `pixel`. All inputs, the mask and the output must share
/// the same shape.
pub(crate) fn process_row_blocks<L, S, I, F>(
    inputs: &[LabelImageView<'_, L>],
    mask: Option<&ArrayView2<'_, u8>>,
    output: &mut LabelImage<L>,
    chunk_rows: Option<usize>,
    masked_label: &L,
    init: I,
    pixel: F,
) where
    L: ClassLabel,
    I: Fn() -> S + Sync + Send,
    F: Fn(&mut S, &[L]) -> L + Sync + Send,
{
    let (height, width) = output.dim();
    if height == 0 || width == 0 {
        return;
    }

    let chunk_size = chunk_rows
        .unwrap_or_else(|| std::cmp::max(1, height / rayon::current_num_threads()))
        .max(1);

    log::debug!(
        "Processing {}x{} pixels in blocks of {} rows",
        height,
        width,
        chunk_size
    );

    let process_block = |(block_idx, mut block): (usize, ArrayViewMut2<'_, L>)| {
        let mut state = init();
        let mut votes: Vec<L> = Vec::with_capacity(inputs.len());
        let start_row = block_idx * chunk_size;

        for (local_row, mut row) in block.axis_iter_mut(Axis(0)).enumerate() {
            let global_row = start_row + local_row;
            for col in 0..width {
                if let Some(mask) = mask {
                    if mask[[global_row, col]] == 0 {
                        row[col] = masked_label.clone();
                        continue;
                    }
                }

                votes.clear();
                votes.extend(inputs.iter().map(|image| image[[global_row, col]].clone()));
                row[col] = pixel(&mut state, &votes);
            }
        }
    };

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        output
            .axis_chunks_iter_mut(Axis(0), chunk_size)
            .into_par_iter()
            .enumerate()
            .for_each(process_block);
    }

    #[cfg(not(feature = "parallel"))]
    {
        output
            .axis_chunks_iter_mut(Axis(0), chunk_size)
            .enumerate()
            .for_each(process_block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn test_every_pixel_written_once_with_small_blocks() {
        let a = Array2::from_shape_fn((7, 5), |(i, j)| (i * 5 + j) as i32);
        let b = a.mapv(|v| v * 10);
        let mut out = Array2::from_elem((7, 5), -1);

        process_row_blocks(
            &[a.view(), b.view()],
            None,
            &mut out,
            Some(2),
            &-1,
            || 0usize,
            |calls, votes| {
                *calls += 1;
                votes[0] + votes[1]
            },
        );

        assert_eq!(out, a.mapv(|v| v * 11));
    }

    #[test]
    fn test_masked_pixels_are_skipped() {
        let a = array![[1, 2], [3, 4]];
        let mask = array![[1u8, 0], [0, 255]];
        let mut out = Array2::from_elem((2, 2), 0);

        process_row_blocks(
            &[a.view()],
            Some(&mask.view()),
            &mut out,
            None,
            &99,
            || (),
            |_, votes| votes[0],
        );

        assert_eq!(out, array![[1, 99], [99, 4]]);
    }
}
