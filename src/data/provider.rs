use std::io;
use std::path::{Path, PathBuf};

use log::info;
use ndarray::Array2;

use super::dataset::{PatchSet, PatchedImage};
use crate::backend::Elm;
use crate::error::{Result, SdaError, ensure_dim};

/// Everything a training run and the subsequent denoising need.
#[derive(Debug, Clone)]
pub struct LoadedDataset {
    /// Clean/noisy training patches, every channel of every image.
    pub patches: PatchSet,
    pub clean_images: Vec<PatchedImage>,
    pub noisy_images: Vec<PatchedImage>,
    /// `(width, height)` of a patch.
    pub patch_size: (usize, usize),
}

/// Source of paired clean/noisy data. `noise_dataset_names[i]` is the noisy
/// rendering of `dataset_names[i]`.
pub trait DatasetProvider {
    fn load(&self, dataset_names: &[String], noise_dataset_names: &[String]) -> Result<LoadedDataset>;
}

/// Reads `<root>/<name>.<extension>` images and tiles them into patches.
#[derive(Debug, Clone)]
pub struct ImageFolderProvider {
    root: PathBuf,
    patch_width: usize,
    patch_height: usize,
    extension: String,
}

impl ImageFolderProvider {
    pub fn new<P: Into<PathBuf>>(root: P, patch_width: usize, patch_height: usize) -> Self {
        Self {
            root: root.into(),
            patch_width,
            patch_height,
            extension: "png".to_string(),
        }
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.to_string();
        self
    }

    fn image_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, self.extension))
    }

    /// Loads one image as `r`, `g`, `b` planes normalized to [0, 1].
    pub fn load_image(&self, name: &str) -> Result<PatchedImage> {
        let path = self.image_path(name);
        let planes = read_rgb_planes(&path)?;
        PatchedImage::from_planes(planes, self.patch_width, self.patch_height)
    }
}

fn read_rgb_planes(path: &Path) -> Result<Vec<(String, Array2<Elm>)>> {
    if !path.is_file() {
        return Err(SdaError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("dataset image {} not found", path.display()),
        )));
    }
    let rgb = image::open(path)?.to_rgb8();
    let (w, h) = (rgb.width() as usize, rgb.height() as usize);
    let mut planes = [
        Array2::<Elm>::zeros((h, w)),
        Array2::<Elm>::zeros((h, w)),
        Array2::<Elm>::zeros((h, w)),
    ];
    for (x, y, pixel) in rgb.enumerate_pixels() {
        for (c, plane) in planes.iter_mut().enumerate() {
            plane[[y as usize, x as usize]] = pixel[c] as Elm / 255.0;
        }
    }
    let [r, g, b] = planes;
    Ok(vec![
        ("r".to_string(), r),
        ("g".to_string(), g),
        ("b".to_string(), b),
    ])
}

impl DatasetProvider for ImageFolderProvider {
    fn load(&self, dataset_names: &[String], noise_dataset_names: &[String]) -> Result<LoadedDataset> {
        ensure_dim(
            "noisy dataset count",
            dataset_names.len(),
            noise_dataset_names.len(),
        )?;
        if dataset_names.is_empty() {
            return Err(SdaError::Config("no dataset names given".to_string()));
        }

        let mut clean_images = Vec::with_capacity(dataset_names.len());
        let mut noisy_images = Vec::with_capacity(dataset_names.len());
        let mut sets = Vec::with_capacity(dataset_names.len());
        for (clean_name, noisy_name) in dataset_names.iter().zip(noise_dataset_names) {
            let clean = self.load_image(clean_name)?;
            let noisy = self.load_image(noisy_name)?;
            ensure_dim("noisy image width", clean.width(), noisy.width())?;
            ensure_dim("noisy image height", clean.height(), noisy.height())?;
            sets.push(PatchSet::new(
                clean.stacked_patches()?,
                noisy.stacked_patches()?,
            )?);
            info!(
                "loaded {} / {} ({}x{}, {} patches per channel)",
                clean_name,
                noisy_name,
                clean.width(),
                clean.height(),
                clean.n_patches()
            );
            clean_images.push(clean);
            noisy_images.push(noisy);
        }

        Ok(LoadedDataset {
            patches: PatchSet::concat(&sets)?,
            clean_images,
            noisy_images,
            patch_size: (self.patch_width, self.patch_height),
        })
    }
}
