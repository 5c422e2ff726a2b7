// 该文件是 PyLab Detect （检测后处理） 项目的一部分。
// src/bin/inspect_model.rs - 查看模型输入输出
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use pylab_detect::{
  FromUrl,
  config::InputSize,
  frame::NchwTensor,
  model::{Model, OnnxModelBuilder},
};
use tracing::info;

/// 打印 ONNX 模型的输入输出信息
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型：onnx:///path/to/model.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 用全零输入试跑一次，打印实际输出形状
  #[arg(long)]
  pub dry_run: bool,
  #[arg(long, default_value_t = InputSize::default(), value_name = "WxH")]
  pub input_size: InputSize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  info!("模型文件路径: {}", args.model);

  let model = OnnxModelBuilder::from_url(&args.model)?.build()?;

  for input in model.inputs() {
    info!("输入 {}: {}", input.name, input.value_type);
  }
  for output in model.outputs() {
    info!("输出 {}: {}", output.name, output.value_type);
  }

  if args.dry_run {
    let tensor = NchwTensor::with_shape(
      args.input_size.height as usize,
      args.input_size.width as usize,
    );
    let now = std::time::Instant::now();
    let outputs = model.infer(&tensor)?;
    info!("试跑完成，耗时: {:.2?}", now.elapsed());
    for (index, raw) in outputs.iter().enumerate() {
      info!("输出 #{} 形状: {:?}", index, raw.shape());
    }
  }

  Ok(())
}
