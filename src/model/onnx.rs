// 该文件是 PyLab Detect （检测后处理） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 推理后端
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

use std::{path::Path, sync::Mutex};

use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::Tensor,
};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::NchwTensor,
  model::{DecodeError, Model, RawOutput},
  url_path,
};

#[derive(Error, Debug)]
pub enum OnnxModelError {
  #[error("模型文件不存在: {0}")]
  ModelNotFound(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(String),
  #[error("模型没有输入")]
  NoInput,
  #[error("推理会话锁已损坏")]
  SessionPoisoned,
  #[error(transparent)]
  Output(#[from] DecodeError),
}

impl OnnxModelError {
  fn ort(msg: &str, e: impl std::fmt::Display) -> Self {
    OnnxModelError::OrtError(format!("{}: {}", msg, e))
  }
}

/// 模型输入/输出的名称与类型描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorInfo {
  pub name: String,
  pub value_type: String,
}

pub struct OnnxModelBuilder {
  model_path: String,
  intra_threads: Option<usize>,
}

impl FromUrlWithScheme for OnnxModelBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxModelBuilder {
  type Error = OnnxModelError;

  /// `onnx:///path/to/model.onnx[?threads=N]`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OnnxModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut intra_threads = None;
    for (k, v) in url.query_pairs() {
      if k == "threads" {
        let threads = v
          .parse()
          .map_err(|_| OnnxModelError::ModelPathError(format!("线程数无效: {}", v)))?;
        intra_threads = Some(threads);
      }
    }

    Ok(OnnxModelBuilder {
      model_path: url_path(url),
      intra_threads,
    })
  }
}

impl OnnxModelBuilder {
  pub fn new(model_path: impl Into<String>) -> Self {
    Self {
      model_path: model_path.into(),
      intra_threads: None,
    }
  }

  pub fn intra_threads(mut self, threads: usize) -> Self {
    self.intra_threads = Some(threads);
    self
  }

  pub fn build(self) -> Result<OnnxModel, OnnxModelError> {
    if !Path::new(&self.model_path).exists() {
      error!("模型文件不存在: {}", self.model_path);
      return Err(OnnxModelError::ModelNotFound(self.model_path));
    }

    info!("加载模型文件: {}", self.model_path);
    let mut builder = Session::builder()
      .map_err(|e| OnnxModelError::ort("无法创建会话构建器", e))?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(|e| OnnxModelError::ort("无法设置优化级别", e))?;
    if let Some(threads) = self.intra_threads {
      builder = builder
        .with_intra_threads(threads)
        .map_err(|e| OnnxModelError::ort("无法设置线程数", e))?;
    }
    let session = builder
      .commit_from_file(&self.model_path)
      .map_err(|e| OnnxModelError::ort("无法加载模型", e))?;
    info!("模型加载完成");

    let inputs: Vec<TensorInfo> = session
      .inputs
      .iter()
      .map(|i| TensorInfo {
        name: i.name.clone(),
        value_type: format!("{:?}", i.input_type),
      })
      .collect();
    let outputs: Vec<TensorInfo> = session
      .outputs
      .iter()
      .map(|o| TensorInfo {
        name: o.name.clone(),
        value_type: format!("{:?}", o.output_type),
      })
      .collect();

    let input_name = inputs.first().ok_or(OnnxModelError::NoInput)?.name.clone();
    debug!("模型输入数量: {}, 输入名称: {}", inputs.len(), input_name);
    debug!("模型输出数量: {}", outputs.len());

    Ok(OnnxModel {
      session: Mutex::new(session),
      input_name,
      inputs,
      outputs,
    })
  }
}

pub struct OnnxModel {
  session: Mutex<Session>,
  input_name: String,
  inputs: Vec<TensorInfo>,
  outputs: Vec<TensorInfo>,
}

impl OnnxModel {
  pub fn input_name(&self) -> &str {
    &self.input_name
  }

  pub fn inputs(&self) -> &[TensorInfo] {
    &self.inputs
  }

  pub fn outputs(&self) -> &[TensorInfo] {
    &self.outputs
  }
}

impl Model for OnnxModel {
  type Error = OnnxModelError;

  fn infer(&self, input: &NchwTensor) -> Result<Vec<RawOutput>, Self::Error> {
    let tensor = Tensor::from_array((input.shape(), input.as_slice().to_vec()))
      .map_err(|e| OnnxModelError::ort("无法创建输入张量", e))?;

    let mut session = self
      .session
      .lock()
      .map_err(|_| OnnxModelError::SessionPoisoned)?;

    debug!("执行模型推理");
    let outputs = session
      .run(ort::inputs![self.input_name.as_str() => tensor])
      .map_err(|e| OnnxModelError::ort("推理失败", e))?;

    let mut raws = Vec::with_capacity(outputs.len());
    for value in outputs.values() {
      let (shape, data) = value
        .try_extract_tensor::<f32>()
        .map_err(|e| OnnxModelError::ort("无法读取输出张量", e))?;
      let shape: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
      debug!("输出形状: {:?}", shape);
      raws.push(RawOutput::new(shape, data.to_vec())?);
    }

    Ok(raws)
  }
}
