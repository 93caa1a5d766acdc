//! Pixel grids and frame selection.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Modality-scaled sample values for one or more frames.
///
/// `data` is frame-major then row-major and always holds
/// `frames * rows * columns` values.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelGrid {
    pub frames: usize,
    pub rows: usize,
    pub columns: usize,
    pub data: Vec<f32>,
}

/// A single 2-D frame of sample values.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub rows: usize,
    pub columns: usize,
    pub data: Vec<f32>,
}

/// Which frame was chosen, and whether the choice was a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameSelection {
    pub index: usize,
    pub frame_count: usize,
    pub default_applied: bool,
}

impl PixelGrid {
    /// Whether this grid is a multi-frame volume.
    #[inline]
    pub fn is_volume(&self) -> bool {
        self.frames > 1
    }

    #[inline]
    pub fn frame_len(&self) -> usize {
        self.rows * self.columns
    }

    /// Smallest and largest sample, or `None` for an empty grid.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        min_max(&self.data)
    }
}

impl Frame {
    pub fn min_max(&self) -> Option<(f32, f32)> {
        min_max(&self.data)
    }
}

/// Pick one frame out of a grid.
///
/// - volume, `Some(i)` in range: frame `i`
/// - volume, `Some(i)` out of range: `FrameIndex` error, never clamped
/// - volume, `None`: frame 0 with `default_applied` set
/// - single frame: returned as-is; only index 0 is accepted
pub fn select_frame(
    grid: &PixelGrid,
    requested: Option<usize>,
) -> Result<(Frame, FrameSelection), PipelineError> {
    let frame_count = grid.frames.max(1);
    let (index, default_applied) = match requested {
        Some(i) if i < frame_count => (i, false),
        Some(i) => {
            return Err(PipelineError::FrameIndex {
                requested: i,
                frame_count,
            })
        }
        None => (0, grid.is_volume()),
    };

    let len = grid.frame_len();
    let start = index * len;
    let data = grid
        .data
        .get(start..start + len)
        .ok_or(PipelineError::FrameIndex {
            requested: index,
            frame_count,
        })?
        .to_vec();

    Ok((
        Frame {
            rows: grid.rows,
            columns: grid.columns,
            data,
        },
        FrameSelection {
            index,
            frame_count,
            default_applied,
        },
    ))
}

fn min_max(values: &[f32]) -> Option<(f32, f32)> {
    values.iter().fold(None, |acc, &v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}
