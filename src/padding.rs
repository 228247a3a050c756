/*!
Right padding of the sparse coordinate lists. Every label of an example owns a list of
`(row, column)` coordinates; lists of one example are padded to a rectangular
`[labels, max_coords, 2]` array, then the arrays of a batch are padded to
`[batch, max_labels, max_coords, 2]`. The padding value is `0`.
*/
use crate::encoder::{SparseTagSet, Tag};
use ndarray::{s, Array3, Array4, Axis};

/// Pads the coordinate lists of one example to the length of the longest one.
pub fn pad_coordinates(lists: &[Vec<(usize, usize)>]) -> Array3<Tag> {
    let max_coords = lists.iter().map(|l| l.len()).max().unwrap_or(0);
    let mut padded = Array3::zeros((lists.len(), max_coords, 2));
    for (label, list) in lists.iter().enumerate() {
        for (k, &(row, column)) in list.iter().enumerate() {
            padded[[label, k, 0]] = row as Tag;
            padded[[label, k, 1]] = column as Tag;
        }
    }
    padded
}

/// Sentinel-filled and padded coordinates of a tag set.
pub fn pad_tag_set(tags: &SparseTagSet) -> Array3<Tag> {
    pad_coordinates(&tags.with_sentinel())
}

/// Stacks the padded arrays of a batch, padding the label and coordinate axes to their batch
/// maximum.
pub fn pad_batch(examples: &[Array3<Tag>]) -> Array4<Tag> {
    let max_labels = examples.iter().map(|a| a.len_of(Axis(0))).max().unwrap_or(0);
    let max_coords = examples.iter().map(|a| a.len_of(Axis(1))).max().unwrap_or(0);
    let mut batch = Array4::zeros((examples.len(), max_labels, max_coords, 2));
    for (i, example) in examples.iter().enumerate() {
        let (labels, coords, _) = example.dim();
        batch
            .slice_mut(s![i, ..labels, ..coords, ..])
            .assign(example);
    }
    batch
}
