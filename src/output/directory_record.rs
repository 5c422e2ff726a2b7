// 该文件是 PyLab Detect （检测后处理） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};

use chrono::{Datelike, Local};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::FrameDetections,
  output::{
    Render,
    draw::{Draw, DrawDetectionOnImage, Record, RecordFormat},
  },
  url_path,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("未知的记录格式: {0}")]
  UnknownRecordFormat(String),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 按日期分目录保存标注图像，可选在旁边写检测记录
///
/// `folder:///path/to/dir[?record=json|txt|name][&always]`
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: Draw,
  record: Option<Record>,
  frame_counter: AtomicU16,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let mut record = None;
    for (k, v) in uri.query_pairs() {
      if k == "record" {
        record = Some(match v.as_ref() {
          "txt" | "id" => Record {
            format: RecordFormat::Txt,
            label_with_name: false,
          },
          "name" => Record {
            format: RecordFormat::Txt,
            label_with_name: true,
          },
          "json" => Record {
            format: RecordFormat::Json,
            label_with_name: true,
          },
          other => return Err(DirectoryRecordOutputError::UnknownRecordFormat(other.to_string())),
        });
        break;
      }
    }

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput::new(Path::new(&url_path(uri)), record, always))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: &Path, record: Option<Record>, always: bool) -> Self {
    Self {
      directory: directory.to_path_buf(),
      draw: Draw::default(),
      record,
      frame_counter: AtomicU16::new(0),
      always,
    }
  }

  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self, name: &str) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Local::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }

    Ok(directory.join(format!(
      "{}-{}-{:04X}.png",
      name,
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, name: &str, frame: &FrameDetections) -> Result<(), Self::Error> {
    if !self.always && frame.result.is_empty() {
      debug!("{} 没有检测结果，跳过保存", name);
      return Ok(());
    }

    let path = self.frame_path(name)?;
    let image = self.draw.draw_detection(frame);
    image.save(&path)?;
    if let Some(record) = &self.record {
      record.record(&frame.result, &path)?;
    }
    debug!("保存检测结果到: {}", path.display());
    Ok(())
  }
}
