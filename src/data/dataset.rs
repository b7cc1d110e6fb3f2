use ndarray::{Array2, ArrayView2, Axis, concatenate, s};

use crate::backend::Elm;
use crate::error::{Result, SdaError, ensure_dim};

/// Paired training patches: row `i` of `noisy` is a noisy rendering of row `i` of `clean`.
/// Shape: [Patches, PatchDim]
#[derive(Debug, Clone, PartialEq)]
pub struct PatchSet {
    clean: Array2<Elm>,
    noisy: Array2<Elm>,
}

impl PatchSet {
    pub fn new(clean: Array2<Elm>, noisy: Array2<Elm>) -> Result<Self> {
        ensure_dim("noisy patch count", clean.nrows(), noisy.nrows())?;
        ensure_dim("noisy patch size", clean.ncols(), noisy.ncols())?;
        Ok(Self { clean, noisy })
    }

    /// Stacks several sets vertically. All sets must share the patch size.
    pub fn concat(sets: &[PatchSet]) -> Result<Self> {
        let first = sets
            .first()
            .ok_or_else(|| SdaError::Config("no patch sets to concatenate".to_string()))?;
        for set in sets {
            ensure_dim("patch size", first.patch_dim(), set.patch_dim())?;
        }
        let clean: Vec<_> = sets.iter().map(|s| s.clean.view()).collect();
        let noisy: Vec<_> = sets.iter().map(|s| s.noisy.view()).collect();
        // 形状は上で検証済みなので concatenate は失敗しない
        let clean = concatenate(Axis(0), &clean).map_err(|e| SdaError::Config(e.to_string()))?;
        let noisy = concatenate(Axis(0), &noisy).map_err(|e| SdaError::Config(e.to_string()))?;
        Self::new(clean, noisy)
    }

    pub fn len(&self) -> usize {
        self.clean.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn patch_dim(&self) -> usize {
        self.clean.ncols()
    }

    pub fn clean(&self) -> ArrayView2<'_, Elm> {
        self.clean.view()
    }

    pub fn noisy(&self) -> ArrayView2<'_, Elm> {
        self.noisy.view()
    }

    /// New set made of the given rows, in the given order.
    pub fn select(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.len()) {
            return Err(SdaError::DimensionMismatch {
                context: "patch index",
                expected: self.len(),
                actual: bad,
            });
        }
        Self::new(
            self.clean.select(Axis(0), indices),
            self.noisy.select(Axis(0), indices),
        )
    }

    /// Rows `[index * batch_size, (index + 1) * batch_size)` of both matrices.
    pub fn batch(
        &self,
        index: usize,
        batch_size: usize,
    ) -> Result<(ArrayView2<'_, Elm>, ArrayView2<'_, Elm>)> {
        let range = index
            .checked_mul(batch_size)
            .and_then(|begin| Some((begin, begin.checked_add(batch_size)?)));
        let (begin, end) = match range {
            Some((begin, end)) if batch_size > 0 && end <= self.len() => (begin, end),
            _ => {
                return Err(SdaError::BatchSize {
                    batch_size,
                    n_patches: self.len(),
                });
            }
        };
        Ok((
            self.clean.slice(s![begin..end, ..]),
            self.noisy.slice(s![begin..end, ..]),
        ))
    }
}

/// Patches of one colour channel. Shape: [Patches, PatchDim]
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelPatches {
    pub name: String,
    pub data: Array2<Elm>,
}

/// A full image cut into non-overlapping patches, one patch matrix per channel.
///
/// Patches are ordered row-major over the patch grid and pixels row-major
/// inside a patch, so the image can be put back together after denoising.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchedImage {
    width: usize,
    height: usize,
    patch_width: usize,
    patch_height: usize,
    channels: Vec<ChannelPatches>,
}

impl PatchedImage {
    /// Cuts `[Height, Width]` channel planes into patches. Planes are cropped
    /// to a whole number of patches; every plane must have the same size.
    pub fn from_planes(
        planes: Vec<(String, Array2<Elm>)>,
        patch_width: usize,
        patch_height: usize,
    ) -> Result<Self> {
        if patch_width == 0 || patch_height == 0 {
            return Err(SdaError::Config(format!(
                "patch size must be positive, got {}x{}",
                patch_width, patch_height
            )));
        }
        let (full_h, full_w) = match planes.first() {
            Some((_, plane)) => plane.dim(),
            None => return Err(SdaError::Config("image has no channels".to_string())),
        };
        let grid_x = full_w / patch_width;
        let grid_y = full_h / patch_height;
        if grid_x == 0 || grid_y == 0 {
            return Err(SdaError::Config(format!(
                "{}x{} image is smaller than one {}x{} patch",
                full_w, full_h, patch_width, patch_height
            )));
        }

        let patch_dim = patch_width * patch_height;
        let mut channels = Vec::with_capacity(planes.len());
        for (name, plane) in planes {
            ensure_dim("channel height", full_h, plane.nrows())?;
            ensure_dim("channel width", full_w, plane.ncols())?;
            let mut data = Array2::<Elm>::zeros((grid_x * grid_y, patch_dim));
            for gy in 0..grid_y {
                for gx in 0..grid_x {
                    let tile = plane.slice(s![
                        gy * patch_height..(gy + 1) * patch_height,
                        gx * patch_width..(gx + 1) * patch_width
                    ]);
                    let mut row = data.row_mut(gy * grid_x + gx);
                    for (dst, &src) in row.iter_mut().zip(tile.iter()) {
                        *dst = src;
                    }
                }
            }
            channels.push(ChannelPatches { name, data });
        }

        Ok(Self {
            width: grid_x * patch_width,
            height: grid_y * patch_height,
            patch_width,
            patch_height,
            channels,
        })
    }

    /// Reassembles the `[Height, Width]` plane of every channel.
    pub fn to_planes(&self) -> Vec<(String, Array2<Elm>)> {
        let grid_x = self.width / self.patch_width;
        self.channels
            .iter()
            .map(|channel| {
                let mut plane = Array2::<Elm>::zeros((self.height, self.width));
                for (index, patch) in channel.data.outer_iter().enumerate() {
                    let (gy, gx) = (index / grid_x, index % grid_x);
                    let mut tile = plane.slice_mut(s![
                        gy * self.patch_height..(gy + 1) * self.patch_height,
                        gx * self.patch_width..(gx + 1) * self.patch_width
                    ]);
                    for (dst, &src) in tile.iter_mut().zip(patch.iter()) {
                        *dst = src;
                    }
                }
                (channel.name.clone(), plane)
            })
            .collect()
    }

    /// New image whose channel data is `f(channel)`. The result must keep the
    /// patch matrix shape.
    pub fn map_channels<F>(&self, mut f: F) -> Result<Self>
    where
        F: FnMut(&ChannelPatches) -> Result<Array2<Elm>>,
    {
        let mut channels = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let data = f(channel)?;
            ensure_dim("channel patch count", channel.data.nrows(), data.nrows())?;
            ensure_dim("channel patch size", channel.data.ncols(), data.ncols())?;
            channels.push(ChannelPatches {
                name: channel.name.clone(),
                data,
            });
        }
        Ok(Self {
            width: self.width,
            height: self.height,
            patch_width: self.patch_width,
            patch_height: self.patch_height,
            channels,
        })
    }

    /// Every channel's patches stacked vertically (channel-major).
    pub fn stacked_patches(&self) -> Result<Array2<Elm>> {
        let views: Vec<_> = self.channels.iter().map(|c| c.data.view()).collect();
        concatenate(Axis(0), &views).map_err(|e| SdaError::Config(e.to_string()))
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn patch_size(&self) -> (usize, usize) {
        (self.patch_width, self.patch_height)
    }

    pub fn patch_dim(&self) -> usize {
        self.patch_width * self.patch_height
    }

    pub fn n_patches(&self) -> usize {
        (self.width / self.patch_width) * (self.height / self.patch_height)
    }

    pub fn channels(&self) -> &[ChannelPatches] {
        &self.channels
    }
}
