// 该文件是 PyLab Detect （检测后处理） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::debug;

use crate::model::{Candidate, DetectResult, FrameDetections, labels::coco_label};

// 绘制常量
const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const BOX_THICKNESS: i32 = 2;
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_OFFSET: i32 = 10; // 标签底部距框顶的距离
// 超出图像这么远的框线与标签都不可见
const COORD_MARGIN: i32 = 1 << 16;

// 内置点阵字体：3x5，每行低 3 位有效，放大 2 倍绘制
const GLYPH_WIDTH: i32 = 3;
const GLYPH_HEIGHT: i32 = 5;
const GLYPH_SCALE: i32 = 2;
const GLYPH_SPACING: i32 = 1;
const DIGIT_GLYPHS: [[u8; 5]; 10] = [
  [0b111, 0b101, 0b101, 0b101, 0b111],
  [0b010, 0b110, 0b010, 0b010, 0b111],
  [0b111, 0b001, 0b111, 0b100, 0b111],
  [0b111, 0b001, 0b111, 0b001, 0b111],
  [0b101, 0b101, 0b111, 0b001, 0b001],
  [0b111, 0b100, 0b111, 0b001, 0b111],
  [0b111, 0b100, 0b111, 0b101, 0b111],
  [0b111, 0b001, 0b001, 0b001, 0b001],
  [0b111, 0b101, 0b111, 0b101, 0b111],
  [0b111, 0b101, 0b111, 0b001, 0b111],
];
const DOT_GLYPH: [u8; 5] = [0b000, 0b000, 0b000, 0b000, 0b010];

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("无法读取字体文件: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(String),
}

pub struct Draw {
  font: Option<FontArc>,
  font_size: f32,
  box_color: [u8; 3],
  with_class_name: bool,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
      box_color: BOX_COLOR,
      with_class_name: false,
    }
  }
}

impl Draw {
  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  /// 加载 TrueType/OpenType 字体用于标签文本
  pub fn with_font_file(self, path: &Path) -> Result<Self, DrawError> {
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data).map_err(|e| DrawError::InvalidFont(e.to_string()))?;
    Ok(self.with_font(font))
  }

  /// 标签中带 COCO 类别名，需要字体
  pub fn with_class_name(mut self, with_class_name: bool) -> Self {
    self.with_class_name = with_class_name;
    self
  }

  pub fn label(&self, item: &Candidate) -> String {
    let name = coco_label(item.class_id).filter(|_| self.with_class_name && self.font.is_some());
    match name {
      Some(name) => format!("{} {:.2}", name, item.score),
      None => format!("{:.2}", item.score),
    }
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, item: &Candidate) {
    let color = Rgb(self.box_color);
    let bbox = &item.bbox;

    // 向零截断，再限制到图像外 COORD_MARGIN 以内，后续加减不会溢出
    let (w, h) = (image.width() as i32, image.height() as i32);
    let x1 = (bbox.x1 as i32).clamp(-COORD_MARGIN, w + COORD_MARGIN);
    let y1 = (bbox.y1 as i32).clamp(-COORD_MARGIN, h + COORD_MARGIN);
    let x2 = (bbox.x2 as i32).clamp(-COORD_MARGIN, w + COORD_MARGIN);
    let y2 = (bbox.y2 as i32).clamp(-COORD_MARGIN, h + COORD_MARGIN);

    // 描边以框线为中心：外侧一层，框线上一层
    for t in 0..BOX_THICKNESS {
      let offset = t - BOX_THICKNESS / 2;
      let width = x2 - x1 + 1 - 2 * offset;
      let height = y2 - y1 + 1 - 2 * offset;
      if width <= 0 || height <= 0 {
        continue;
      }
      let rect = Rect::at(x1 + offset, y1 + offset).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    let label = self.label(item);
    let bottom = y1 - LABEL_OFFSET;
    match &self.font {
      Some(font) => {
        let top = bottom - self.font_size as i32;
        draw_text_mut(image, color, x1, top, PxScale::from(self.font_size), font, &label);
      }
      None => draw_glyph_text(image, color, x1, bottom - GLYPH_HEIGHT * GLYPH_SCALE, &label),
    }
  }
}

/// 用内置点阵字体绘制数字与小数点，其它字符跳过
fn draw_glyph_text(image: &mut RgbImage, color: Rgb<u8>, x: i32, y: i32, text: &str) {
  let advance = (GLYPH_WIDTH + GLYPH_SPACING) * GLYPH_SCALE;
  let mut cursor = x;

  for ch in text.chars() {
    let glyph = match ch {
      '0'..='9' => Some(DIGIT_GLYPHS[ch as usize - '0' as usize]),
      '.' => Some(DOT_GLYPH),
      _ => None,
    };

    if let Some(rows) = glyph {
      for (row, bits) in rows.iter().enumerate() {
        for col in 0..GLYPH_WIDTH {
          if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
            continue;
          }
          let px = cursor + col * GLYPH_SCALE;
          let py = y + row as i32 * GLYPH_SCALE;
          fill_block(image, color, px, py, GLYPH_SCALE);
        }
      }
    }
    cursor += advance;
  }
}

fn fill_block(image: &mut RgbImage, color: Rgb<u8>, x: i32, y: i32, size: i32) {
  let (w, h) = (image.width() as i32, image.height() as i32);
  for dy in 0..size {
    for dx in 0..size {
      let (px, py) = (x + dx, y + dy);
      if px >= 0 && py >= 0 && px < w && py < h {
        image.put_pixel(px as u32, py as u32, color);
      }
    }
  }
}

pub trait DrawDetectionOnImage {
  fn draw_detections_on_image(&self, image: &mut RgbImage, result: &DetectResult);

  /// 在缩放后的图像副本上绘制
  fn draw_detection(&self, frame: &FrameDetections) -> RgbImage {
    let mut image = frame.canvas.clone();
    self.draw_detections_on_image(&mut image, &frame.result);
    image
  }
}

impl DrawDetectionOnImage for Draw {
  fn draw_detections_on_image(&self, image: &mut RgbImage, result: &DetectResult) {
    debug!("绘制 {} 个检测框", result.len());
    for item in result.iter() {
      self.draw_bbox_with_label(image, item);
    }
  }
}

/// 检测记录的文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
  Txt,
  Json,
}

pub struct Record {
  pub format: RecordFormat,
  pub label_with_name: bool,
}

impl Record {
  fn label(&self, item: &Candidate) -> String {
    match coco_label(item.class_id).filter(|_| self.label_with_name) {
      Some(name) => name.to_string(),
      None => item.class_id.to_string(),
    }
  }

  pub fn render(&self, result: &DetectResult) -> String {
    match self.format {
      RecordFormat::Txt => result
        .iter()
        .map(|item| {
          format!(
            "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}",
            self.label(item),
            item.score,
            item.bbox.x1,
            item.bbox.y1,
            item.bbox.x2,
            item.bbox.y2
          )
        })
        .collect::<Vec<_>>()
        .join("\n"),
      RecordFormat::Json => {
        let items: Vec<serde_json::Value> = result
          .iter()
          .map(|item| {
            serde_json::json!({
              "label": self.label(item),
              "class_id": item.class_id,
              "score": item.score,
              "bbox": item.bbox.to_array(),
            })
          })
          .collect();
        serde_json::Value::Array(items).to_string()
      }
    }
  }

  /// 写在图像旁边，扩展名随格式变化
  pub fn record(&self, result: &DetectResult, path: &Path) -> Result<(), std::io::Error> {
    let extension = match self.format {
      RecordFormat::Txt => "txt",
      RecordFormat::Json => "json",
    };
    std::fs::write(path.with_extension(extension), self.render(result))
  }
}
