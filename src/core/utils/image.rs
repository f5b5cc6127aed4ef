//! image 与 tensor 相互转换

use candle_core::{DType, Device, Tensor};
use image::DynamicImage;

use crate::error::Error;

/// 将图像转换为张量
///
/// output: HWC, f32, 0-1
pub fn image_to_tensor(image: &DynamicImage, device: &Device) -> Result<Tensor, Error> {
    let (width, height) = (image.width(), image.height());

    let img_buffer = image.to_rgb32f().into_raw();
    // HWC
    let tensor = Tensor::from_vec(img_buffer, (height as usize, width as usize, 3), device)?;

    Ok(tensor)
}

/// 将 mask 图像转换为张量
///
/// 灰度通道归一化, output: [1, H, W]
pub fn mask_to_tensor(mask: &DynamicImage, device: &Device) -> Result<Tensor, Error> {
    let luma = mask.to_luma8();
    let (width, height) = luma.dimensions();

    let mask_data: Vec<f32> = luma.pixels().map(|p| p.0[0] as f32 / 255.0).collect();

    // [H, W] -> [1, H, W]
    let tensor = Tensor::from_vec(mask_data, (height as usize, width as usize), device)?
        .to_dtype(DType::F32)?
        .unsqueeze(0)?;

    Ok(tensor)
}

/// 创建全零 mask
///
/// output: [1, H, W]
pub fn zero_mask(height: usize, width: usize, device: &Device) -> Result<Tensor, Error> {
    let tensor = Tensor::zeros((1, height, width), DType::F32, device)?;
    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use image::{GrayImage, Luma, Rgb, RgbImage};

    use super::*;

    #[test]
    fn test_image_to_tensor_shape() -> anyhow::Result<()> {
        let mut img = RgbImage::new(4, 2);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        let img = DynamicImage::ImageRgb8(img);

        let tensor = image_to_tensor(&img, &Device::Cpu)?;
        assert_eq!(tensor.dims(), &[2, 4, 3]);

        // 0-1 归一化
        let first = tensor.get(0)?.get(0)?.to_vec1::<f32>()?;
        assert_eq!(first, vec![1.0, 0.0, 0.0]);

        Ok(())
    }

    #[test]
    fn test_mask_to_tensor_shape() -> anyhow::Result<()> {
        let mut mask = GrayImage::new(3, 2);
        mask.put_pixel(1, 0, Luma([255]));
        let mask = DynamicImage::ImageLuma8(mask);

        let tensor = mask_to_tensor(&mask, &Device::Cpu)?;
        assert_eq!(tensor.dims(), &[1, 2, 3]);

        let row = tensor.get(0)?.get(0)?.to_vec1::<f32>()?;
        assert_eq!(row, vec![0.0, 1.0, 0.0]);

        Ok(())
    }

    #[test]
    fn test_zero_mask() -> anyhow::Result<()> {
        let tensor = zero_mask(2, 3, &Device::Cpu)?;
        assert_eq!(tensor.dims(), &[1, 2, 3]);
        assert_eq!(tensor.sum_all()?.to_scalar::<f32>()?, 0.0);
        Ok(())
    }
}
