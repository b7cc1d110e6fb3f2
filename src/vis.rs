use std::fs;
use std::path::{Path, PathBuf};

use image::{ImageBuffer, Luma, Rgb};
use log::info;
use ndarray::Array2;

use crate::backend::Elm;
use crate::data::dataset::PatchedImage;
use crate::error::{Result, SdaError};

fn to_u8(v: Elm) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Reassembles `image` and writes it to `<output_folder>/<output_name>.png`.
///
/// 1 channel -> Grayscale, 3 channels (R, G, B order) -> RGB.
/// Values are clamped to [0, 1] before scaling to [0, 255].
pub fn save_image(image: &PatchedImage, output_name: &str, output_folder: &Path) -> Result<PathBuf> {
    fs::create_dir_all(output_folder)?;
    let path = output_folder.join(format!("{}.png", output_name));

    let planes: Vec<Array2<Elm>> = image.to_planes().into_iter().map(|(_, p)| p).collect();
    let w = image.width() as u32;
    let h = image.height() as u32;

    match planes.as_slice() {
        [gray] => {
            let data: Vec<u8> = gray.iter().map(|&v| to_u8(v)).collect();
            let img: ImageBuffer<Luma<u8>, Vec<u8>> = ImageBuffer::from_vec(w, h, data)
                .ok_or_else(|| SdaError::Config("Failed to create image buffer".to_string()))?;
            img.save(&path)?;
        }
        [r, g, b] => {
            // ImageBuffer は RGBRGB... のインターリーブ形式を期待する
            let mut rgb_data = Vec::with_capacity(r.len() * 3);
            for ((&rv, &gv), &bv) in r.iter().zip(g.iter()).zip(b.iter()) {
                rgb_data.push(to_u8(rv));
                rgb_data.push(to_u8(gv));
                rgb_data.push(to_u8(bv));
            }
            let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_vec(w, h, rgb_data)
                .ok_or_else(|| SdaError::Config("Failed to create image buffer".to_string()))?;
            img.save(&path)?;
        }
        _ => {
            return Err(SdaError::Config(format!(
                "Unsupported channel count for image saving: {}",
                planes.len()
            )));
        }
    }

    info!("wrote {}", path.display());
    Ok(path)
}
