// 该文件是 PyLab Detect （检测后处理） 项目的一部分。
// src/preprocess.rs - 图像预处理
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use image::{RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::debug;

use crate::{config::InputSize, frame::NchwTensor};

/// 缩放插值方式固定为双线性
pub const RESIZE_FILTER: FilterType = FilterType::Triangle;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreprocessError {
  #[error("图像无效: 尺寸为 {width}x{height}")]
  InvalidImage { width: u32, height: u32 },
}

/// 输入像素的通道顺序
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChannelOrder {
  /// `image` 解码得到的顺序
  #[default]
  Rgb,
  Bgr,
}

impl ChannelOrder {
  /// 目标 RGB 通道 `c` 在源像素中的位置
  fn source_index(self, c: usize) -> usize {
    match self {
      ChannelOrder::Rgb => c,
      ChannelOrder::Bgr => 2 - c,
    }
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Preprocessor {
  target_size: InputSize,
  source_order: ChannelOrder,
}

impl Preprocessor {
  pub fn new(target_size: InputSize) -> Self {
    Self {
      target_size,
      source_order: ChannelOrder::default(),
    }
  }

  pub fn source_order(mut self, order: ChannelOrder) -> Self {
    self.source_order = order;
    self
  }

  pub fn target_size(&self) -> InputSize {
    self.target_size
  }

  /// 缩放到模型输入尺寸；绘制检测结果时应使用同一张图
  pub fn resize(&self, image: &RgbImage) -> Result<RgbImage, PreprocessError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(PreprocessError::InvalidImage { width, height });
    }

    let InputSize { width: tw, height: th } = self.target_size;
    if (width, height) == (tw, th) {
      return Ok(image.clone());
    }
    Ok(image::imageops::resize(image, tw, th, RESIZE_FILTER))
  }

  /// 缩放、转换通道顺序、归一化并转为 NCHW
  pub fn preprocess(&self, image: &RgbImage) -> Result<NchwTensor, PreprocessError> {
    let resized = self.resize(image)?;
    let tensor = self.to_tensor(&resized);
    debug!("预处理完成，张量形状: {:?}", tensor.shape());
    Ok(tensor)
  }

  /// 只做通道转换、归一化与 NCHW 重排，不缩放
  pub fn to_tensor(&self, image: &RgbImage) -> NchwTensor {
    let (width, height) = image.dimensions();
    let mut tensor = NchwTensor::with_shape(height as usize, width as usize);

    let plane_size = (width * height) as usize;
    let slice = tensor.as_mut();

    for (idx, pixel) in image.pixels().enumerate() {
      for c in 0..3 {
        let value = pixel[self.source_order.source_index(c)];
        slice[c * plane_size + idx] = value as f32 / 255.0;
      }
    }
    tensor
  }
}

/// 使用默认通道顺序的预处理
pub fn preprocess(image: &RgbImage, target_size: InputSize) -> Result<NchwTensor, PreprocessError> {
  Preprocessor::new(target_size).preprocess(image)
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn test_empty_image_is_invalid() {
    let image = RgbImage::new(0, 0);
    let err = preprocess(&image, InputSize::new(4, 4)).unwrap_err();
    assert_eq!(err, PreprocessError::InvalidImage { width: 0, height: 0 });
  }

  #[test]
  fn test_chw_layout_and_scaling() {
    let mut image = RgbImage::new(2, 2);
    image.put_pixel(0, 0, Rgb([255, 0, 0]));
    image.put_pixel(1, 0, Rgb([0, 255, 0]));
    image.put_pixel(0, 1, Rgb([0, 0, 255]));
    image.put_pixel(1, 1, Rgb([51, 102, 0]));

    let tensor = preprocess(&image, InputSize::new(2, 2)).unwrap();
    assert_eq!(tensor.shape(), [1, 3, 2, 2]);

    assert_eq!(tensor.get(0, 0, 0), Some(1.0));
    assert_eq!(tensor.get(1, 0, 1), Some(1.0));
    assert_eq!(tensor.get(2, 1, 0), Some(1.0));
    assert_eq!(tensor.get(0, 1, 1), Some(0.2));
    assert_eq!(tensor.get(1, 1, 1), Some(0.4));
    assert_eq!(tensor.get(2, 1, 1), Some(0.0));
  }

  #[test]
  fn test_bgr_source_is_swapped() {
    let image = RgbImage::from_pixel(1, 1, Rgb([10, 20, 255]));
    let tensor = Preprocessor::new(InputSize::new(1, 1))
      .source_order(ChannelOrder::Bgr)
      .preprocess(&image)
      .unwrap();

    assert_eq!(tensor.get(0, 0, 0), Some(1.0));
    assert_eq!(tensor.get(2, 0, 0), Some(10.0 / 255.0));
  }

  #[test]
  fn test_resize_to_target() {
    let image = RgbImage::from_pixel(32, 16, Rgb([128, 128, 128]));
    let tensor = preprocess(&image, InputSize::new(8, 4)).unwrap();
    assert_eq!(tensor.shape(), [1, 3, 4, 8]);

    // 均匀图像缩放后数值基本不变
    let expected = 128.0 / 255.0;
    assert!(
      tensor
        .as_slice()
        .iter()
        .all(|v| (v - expected).abs() <= 1.0 / 255.0 + 1e-6)
    );
  }
}
