//! The N-to-M scatter at the heart of `fill_selection`: given a
//! [`SelectionDescriptor`] and the concatenated bytes of every owned
//! connection's current partition (in connection order), copies each
//! connection's overlap with the desired window into the caller's
//! buffer, laid out in the window's own local coordinates.
//!
//! Dimension order follows the schema's own declared order: dimension 0
//! varies fastest, matching a `pixels[y * width + x]` convention for a
//! `[width, height]`-dimensioned array. Only 1, 2, and 3 dimensions are
//! supported, so each arity gets its own explicit nested loop rather
//! than a generic N-dimensional walker.

use crate::error::{Result, StreamError};
use crate::select::SelectionDescriptor;

pub fn scatter_window(
    descriptor: &SelectionDescriptor,
    element_size: usize,
    concatenated: &[u8],
    user_buffer: &mut [u8],
) -> Result<()> {
    match descriptor.window_size.len() {
        1 => scatter_1d(descriptor, element_size, concatenated, user_buffer),
        2 => scatter_2d(descriptor, element_size, concatenated, user_buffer),
        3 => scatter_3d(descriptor, element_size, concatenated, user_buffer),
        other => Err(StreamError::InvalidSelectionDims(other as u32)),
    }
}

fn copy_element(src: &[u8], src_idx: usize, dst: &mut [u8], dst_idx: usize, element_size: usize) {
    dst[dst_idx..dst_idx + element_size]
        .copy_from_slice(&src[src_idx..src_idx + element_size]);
}

fn scatter_1d(
    descriptor: &SelectionDescriptor,
    element_size: usize,
    concatenated: &[u8],
    user_buffer: &mut [u8],
) -> Result<()> {
    let wo = descriptor.window_offset[0];
    let ws = descriptor.window_size[0];

    let mut src_base = 0usize;
    for chunk in &descriptor.owned_chunks {
        let cs = chunk.l_size[0];
        let co = chunk.l_offset[0];
        let chunk_len = cs as usize * element_size;

        let start = co.max(wo);
        let end = (co + cs).min(wo + ws);
        for x in start..end {
            let src_idx = src_base + (x - co) as usize * element_size;
            let dst_idx = (x - wo) as usize * element_size;
            copy_element(concatenated, src_idx, user_buffer, dst_idx, element_size);
        }
        src_base += chunk_len;
    }
    Ok(())
}

fn scatter_2d(
    descriptor: &SelectionDescriptor,
    element_size: usize,
    concatenated: &[u8],
    user_buffer: &mut [u8],
) -> Result<()> {
    let (wo_x, wo_y) = (descriptor.window_offset[0], descriptor.window_offset[1]);
    let (ws_x, ws_y) = (descriptor.window_size[0], descriptor.window_size[1]);

    let mut src_base = 0usize;
    for chunk in &descriptor.owned_chunks {
        let (cs_x, cs_y) = (chunk.l_size[0], chunk.l_size[1]);
        let (co_x, co_y) = (chunk.l_offset[0], chunk.l_offset[1]);
        let chunk_len = cs_x as usize * cs_y as usize * element_size;

        let start_x = co_x.max(wo_x);
        let end_x = (co_x + cs_x).min(wo_x + ws_x);
        let start_y = co_y.max(wo_y);
        let end_y = (co_y + cs_y).min(wo_y + ws_y);

        for y in start_y..end_y {
            for x in start_x..end_x {
                let src_idx = src_base
                    + ((y - co_y) as usize * cs_x as usize + (x - co_x) as usize) * element_size;
                let dst_idx = ((y - wo_y) as usize * ws_x as usize + (x - wo_x) as usize)
                    * element_size;
                copy_element(concatenated, src_idx, user_buffer, dst_idx, element_size);
            }
        }
        src_base += chunk_len;
    }
    Ok(())
}

fn scatter_3d(
    descriptor: &SelectionDescriptor,
    element_size: usize,
    concatenated: &[u8],
    user_buffer: &mut [u8],
) -> Result<()> {
    let (wo_x, wo_y, wo_z) = (
        descriptor.window_offset[0],
        descriptor.window_offset[1],
        descriptor.window_offset[2],
    );
    let (ws_x, ws_y, ws_z) = (
        descriptor.window_size[0],
        descriptor.window_size[1],
        descriptor.window_size[2],
    );

    let mut src_base = 0usize;
    for chunk in &descriptor.owned_chunks {
        let (cs_x, cs_y, cs_z) = (chunk.l_size[0], chunk.l_size[1], chunk.l_size[2]);
        let (co_x, co_y, co_z) = (chunk.l_offset[0], chunk.l_offset[1], chunk.l_offset[2]);
        let chunk_len = cs_x as usize * cs_y as usize * cs_z as usize * element_size;

        let start_x = co_x.max(wo_x);
        let end_x = (co_x + cs_x).min(wo_x + ws_x);
        let start_y = co_y.max(wo_y);
        let end_y = (co_y + cs_y).min(wo_y + ws_y);
        let start_z = co_z.max(wo_z);
        let end_z = (co_z + cs_z).min(wo_z + ws_z);

        for z in start_z..end_z {
            for y in start_y..end_y {
                for x in start_x..end_x {
                    let src_idx = src_base
                        + ((z - co_z) as usize * cs_y as usize * cs_x as usize
                            + (y - co_y) as usize * cs_x as usize
                            + (x - co_x) as usize)
                            * element_size;
                    let dst_idx = ((z - wo_z) as usize * ws_y as usize * ws_x as usize
                        + (y - wo_y) as usize * ws_x as usize
                        + (x - wo_x) as usize)
                        * element_size;
                    copy_element(concatenated, src_idx, user_buffer, dst_idx, element_size);
                }
            }
        }
        src_base += chunk_len;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::select::ConnPartition;

    /// A 2x2 grid of tiles, each filled with its producing rank, selected
    /// as one contiguous window covering the whole global array.
    #[test]
    fn scatters_a_2x2_tile_grid_into_one_contiguous_window() {
        let tile_w = 4u32;
        let tile_h = 3u32;
        let cols = 2u32;
        let rows = 2u32;
        let global_w = tile_w * cols;
        let global_h = tile_h * rows;

        let mut owned_chunks = Vec::new();
        let mut concatenated = Vec::new();
        let mut rank = 0u8;
        for row in 0..rows {
            for col in 0..cols {
                owned_chunks.push(ConnPartition {
                    l_size: vec![tile_w, tile_h],
                    l_offset: vec![col * tile_w, row * tile_h],
                });
                concatenated.extend(std::iter::repeat(rank).take((tile_w * tile_h) as usize));
                rank += 1;
            }
        }

        let descriptor = SelectionDescriptor {
            owned_chunks,
            window_size: vec![global_w, global_h],
            window_offset: vec![0, 0],
        };

        let mut user_buffer = vec![0u8; (global_w * global_h) as usize];
        scatter_window(&descriptor, 1, &concatenated, &mut user_buffer).unwrap();

        for y in 0..global_h {
            for x in 0..global_w {
                let expected_col = x / tile_w;
                let expected_row = y / tile_h;
                let expected_rank = (expected_row * cols + expected_col) as u8;
                assert_eq!(
                    user_buffer[(y * global_w + x) as usize],
                    expected_rank,
                    "mismatch at ({x},{y})"
                );
            }
        }
    }

    #[test]
    fn scatters_only_the_requested_sub_window() {
        let descriptor = SelectionDescriptor {
            owned_chunks: vec![ConnPartition {
                l_size: vec![10],
                l_offset: vec![0],
            }],
            window_size: vec![4],
            window_offset: vec![3],
        };
        let concatenated: Vec<u8> = (0..10).collect();
        let mut user_buffer = vec![0u8; 4];
        scatter_window(&descriptor, 1, &concatenated, &mut user_buffer).unwrap();
        assert_eq!(user_buffer, vec![3, 4, 5, 6]);
    }

    #[test]
    fn skips_chunks_that_do_not_overlap_the_window() {
        let descriptor = SelectionDescriptor {
            owned_chunks: vec![
                ConnPartition {
                    l_size: vec![5],
                    l_offset: vec![0],
                },
                ConnPartition {
                    l_size: vec![5],
                    l_offset: vec![5],
                },
            ],
            window_size: vec![3],
            window_offset: vec![6],
        };
        let concatenated: Vec<u8> = (0..10).collect();
        let mut user_buffer = vec![0u8; 3];
        scatter_window(&descriptor, 1, &concatenated, &mut user_buffer).unwrap();
        assert_eq!(user_buffer, vec![6, 7, 8]);
    }

    #[test]
    fn three_dimensional_scatter_places_a_single_interior_voxel() {
        let descriptor = SelectionDescriptor {
            owned_chunks: vec![ConnPartition {
                l_size: vec![2, 2, 2],
                l_offset: vec![0, 0, 0],
            }],
            window_size: vec![2, 2, 2],
            window_offset: vec![0, 0, 0],
        };
        // value at (x=1, y=0, z=1) = 1 + 2*(0 + 2*1) = 5
        let concatenated: Vec<u8> = (0..8).collect();
        let mut user_buffer = vec![0u8; 8];
        scatter_window(&descriptor, 1, &concatenated, &mut user_buffer).unwrap();
        assert_eq!(user_buffer, concatenated);
    }
}
