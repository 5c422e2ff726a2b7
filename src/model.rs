// 该文件是 PyLab Detect （检测后处理） 项目的一部分。
// src/model.rs - 模型与检测流水线
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

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  config::{ConfigError, DetectConfig},
  frame::NchwTensor,
  geometry::CornerBox,
  preprocess::{PreprocessError, Preprocessor},
};

pub mod decode;
pub mod labels;
pub mod nms;

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxModel, OnnxModelBuilder, OnnxModelError, TensorInfo};

pub use self::decode::{DecodeError, YoloDecoder};

/// 推理后端：输入预处理后的张量，输出一个或多个原始张量
pub trait Model {
  type Error;

  fn infer(&self, input: &NchwTensor) -> Result<Vec<RawOutput>, Self::Error>;
}

/// 模型原始输出张量（行主序）
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
  shape: Box<[usize]>,
  data: Box<[f32]>,
}

impl RawOutput {
  pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, DecodeError> {
    let expected: usize = shape.iter().product();
    if expected != data.len() {
      return Err(DecodeError::malformed(format!(
        "形状 {:?} 需要 {} 个元素, 实际为 {}",
        shape,
        expected,
        data.len()
      )));
    }
    Ok(Self {
      shape: shape.into_boxed_slice(),
      data: data.into_boxed_slice(),
    })
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub fn data(&self) -> &[f32] {
    &self.data
  }
}

/// 一个检测候选：角点框、置信度与类别
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
  pub bbox: CornerBox,
  pub score: f32,
  pub class_id: u32,
}

/// NMS 之后的检测结果，按选中顺序排列
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[Candidate]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Candidate> {
    self.items.iter()
  }
}

impl From<Vec<Candidate>> for DetectResult {
  fn from(items: Vec<Candidate>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

/// 单帧检测输出：模型所见的缩放图像与检测结果
#[derive(Debug, Clone)]
pub struct FrameDetections {
  pub canvas: RgbImage,
  pub result: DetectResult,
}

#[derive(Error, Debug)]
pub enum DetectorError<E> {
  #[error("图像无效: {0}")]
  InvalidImage(#[from] PreprocessError),
  #[error("推理失败: {0}")]
  Inference(E),
  #[error("模型没有输出张量")]
  MissingOutput,
  #[error(transparent)]
  MalformedOutput(#[from] DecodeError),
}

/// 预处理、推理、解码与 NMS 的组合
pub struct Detector<M> {
  model: M,
  preprocessor: Preprocessor,
  decoder: YoloDecoder,
  iou_threshold: f32,
}

impl<M: Model> Detector<M> {
  /// 配置先经过 [`DetectConfig::validate`]，非法配置不会进入流水线
  pub fn new(model: M, config: &DetectConfig) -> Result<Self, ConfigError> {
    config.validate()?;
    info!(
      "创建检测器: 输入尺寸 {}, 置信度阈值 {}, IoU 阈值 {}",
      config.input_size, config.conf_threshold, config.iou_threshold
    );
    Ok(Self {
      model,
      preprocessor: Preprocessor::new(config.input_size),
      decoder: YoloDecoder::new(config.conf_threshold),
      iou_threshold: config.iou_threshold,
    })
  }

  pub fn with_preprocessor(mut self, preprocessor: Preprocessor) -> Self {
    self.preprocessor = preprocessor;
    self
  }

  pub fn with_decoder(mut self, decoder: YoloDecoder) -> Self {
    self.decoder = decoder;
    self
  }

  pub fn model(&self) -> &M {
    &self.model
  }

  /// 对一张图像运行完整的检测流水线
  pub fn detect(&self, image: &RgbImage) -> Result<FrameDetections, DetectorError<M::Error>> {
    let canvas = self.preprocessor.resize(image)?;
    let tensor = self.preprocessor.to_tensor(&canvas);

    let now = std::time::Instant::now();
    let outputs = self.model.infer(&tensor).map_err(DetectorError::Inference)?;
    debug!("推理完成，耗时: {:.2?}, 输出数量: {}", now.elapsed(), outputs.len());

    let raw = outputs.first().ok_or(DetectorError::MissingOutput)?;
    debug!("第一个输出形状: {:?}", raw.shape());

    let candidates = self.decoder.decode(raw)?;
    let kept = nms::suppress(&candidates, self.iou_threshold);
    info!("检测到 {} 个物体", kept.len());

    Ok(FrameDetections {
      canvas,
      result: DetectResult::from(kept),
    })
  }
}
