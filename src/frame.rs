// 该文件是 PyLab Detect （检测后处理） 项目的一部分。
// src/frame.rs - NCHW 浮点张量定义
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

pub const RGB_CHANNELS: usize = 3;

/// 模型输入张量，逻辑形状为 `(1, 3, H, W)`，数值范围 `[0, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct NchwTensor {
  width: usize,
  height: usize,
  data: Box<[f32]>,
}

impl NchwTensor {
  pub fn with_shape(height: usize, width: usize) -> Self {
    let size = RGB_CHANNELS * width * height;
    Self {
      width,
      height,
      data: vec![0.0f32; size].into_boxed_slice(),
    }
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  /// 含批次维度的形状
  pub fn shape(&self) -> [usize; 4] {
    [1, RGB_CHANNELS, self.height, self.width]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  /// 读取 `(c, y, x)` 处的值
  pub fn get(&self, c: usize, y: usize, x: usize) -> Option<f32> {
    if c >= RGB_CHANNELS || y >= self.height || x >= self.width {
      return None;
    }
    self
      .data
      .get(c * self.height * self.width + y * self.width + x)
      .copied()
  }
}

impl AsMut<[f32]> for NchwTensor {
  fn as_mut(&mut self) -> &mut [f32] {
    &mut self.data
  }
}

impl AsRef<[f32]> for NchwTensor {
  fn as_ref(&self) -> &[f32] {
    &self.data
  }
}

impl From<NchwTensor> for Vec<f32> {
  fn from(tensor: NchwTensor) -> Self {
    tensor.data.into_vec()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_shape_and_layout() {
    let mut tensor = NchwTensor::with_shape(2, 3);
    assert_eq!(tensor.shape(), [1, 3, 2, 3]);
    assert_eq!(tensor.as_slice().len(), 18);

    // 第二个通道, y = 1, x = 2
    tensor.as_mut()[6 + 3 + 2] = 0.5;
    assert_eq!(tensor.get(1, 1, 2), Some(0.5));
    assert_eq!(tensor.get(3, 0, 0), None);
    assert_eq!(tensor.get(0, 2, 0), None);
  }
}
