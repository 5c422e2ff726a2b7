// 该文件是 PyLab Detect （检测后处理） 项目的一部分。
// src/geometry.rs - 边界框几何运算
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

/// 中心点格式的边界框 `[cx, cy, w, h]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CenterBox {
  pub cx: f32,
  pub cy: f32,
  pub w: f32,
  pub h: f32,
}

/// 角点格式的边界框 `[x1, y1, x2, y2]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CornerBox {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
}

impl CenterBox {
  pub fn new(cx: f32, cy: f32, w: f32, h: f32) -> Self {
    Self { cx, cy, w, h }
  }

  pub fn to_corner(&self) -> CornerBox {
    center_to_corner(*self)
  }
}

impl From<[f32; 4]> for CenterBox {
  fn from([cx, cy, w, h]: [f32; 4]) -> Self {
    Self { cx, cy, w, h }
  }
}

impl CornerBox {
  pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
    Self { x1, y1, x2, y2 }
  }

  pub fn width(&self) -> f32 {
    self.x2 - self.x1
  }

  pub fn height(&self) -> f32 {
    self.y2 - self.y1
  }

  /// 面积；倒置的框记为 0 而不是负数
  pub fn area(&self) -> f32 {
    self.width().max(0.0) * self.height().max(0.0)
  }

  pub fn iou(&self, other: &CornerBox) -> f32 {
    iou(self, other)
  }

  pub fn to_array(&self) -> [f32; 4] {
    [self.x1, self.y1, self.x2, self.y2]
  }
}

impl From<[f32; 4]> for CornerBox {
  fn from([x1, y1, x2, y2]: [f32; 4]) -> Self {
    Self { x1, y1, x2, y2 }
  }
}

/// `[cx, cy, w, h]` 转为 `[x1, y1, x2, y2]`
pub fn center_to_corner(b: CenterBox) -> CornerBox {
  let half_w = b.w / 2.0;
  let half_h = b.h / 2.0;
  CornerBox {
    x1: b.cx - half_w,
    y1: b.cy - half_h,
    x2: b.cx + half_w,
    y2: b.cy + half_h,
  }
}

/// 计算两个角点格式边界框的 IoU
///
/// 两个框都退化（并集为 0）时返回 0。
pub fn iou(a: &CornerBox, b: &CornerBox) -> f32 {
  let x1 = a.x1.max(b.x1);
  let y1 = a.y1.max(b.y1);
  let x2 = a.x2.min(b.x2);
  let y2 = a.y2.min(b.y2);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let union = a.area() + b.area() - intersection;

  if union == 0.0 {
    return 0.0;
  }
  intersection / union
}
