// 该文件是 PyLab Detect （检测后处理） 项目的一部分。
// src/bin/detect_batch.rs - 批量图像检测
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use url::Url;

use pylab_detect::{
  FromUrl,
  config::{DetectArgs, DetectConfig},
  input::InputWrapper,
  model::{Detector, OnnxModelBuilder},
  output::{OutputWrapper, draw::Draw},
  task::{BatchTask, Task},
};
use tracing::{info, warn};

/// 对目录中的全部图像运行检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型：onnx:///path/to/model.onnx[?threads=N]
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源：folder:///path/to/images 或 image:///path/to/image.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出目录：folder:///path/to/dir[?record=json|txt|name][&always]
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  #[command(flatten)]
  pub detect: DetectArgs,
  /// 标签字体文件（TTF/OTF）
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
  /// 标签中附带 COCO 类别名（需要字体）
  #[arg(long)]
  pub class_name: bool,
  /// 最多处理的图像数，不指定表示全部
  #[arg(long, value_name = "COUNT")]
  pub max_images: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let config = DetectConfig::try_from(&args.detect)?;
  let mut draw = Draw::default().with_class_name(args.class_name);
  if let Some(font) = &args.font {
    draw = draw.with_font_file(font)?;
  }

  let input = InputWrapper::from_url(&args.input)?;
  let model = OnnxModelBuilder::from_url(&args.model)?.build()?;
  let output = OutputWrapper::from_url(&args.output)?.with_draw(draw);
  let detector = Detector::new(model, &config)?;

  let summary = BatchTask::default()
    .with_max_images(args.max_images)
    .run_task(input, &detector, &output)?;

  for name in &summary.failed {
    warn!("处理失败: {}", name);
  }

  Ok(())
}
