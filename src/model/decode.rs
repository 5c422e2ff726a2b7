// 该文件是 PyLab Detect （检测后处理） 项目的一部分。
// src/model/decode.rs - YOLO 原始输出解码
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

use thiserror::Error;
use tracing::{debug, error};

use crate::{
  geometry::CenterBox,
  model::{Candidate, RawOutput},
};

/// 框 (4) + 目标置信度 (1)
pub const BOX_CHANNELS: usize = 4;
pub const OBJECTNESS_CHANNEL: usize = 4;
pub const CLASS_CHANNEL_OFFSET: usize = 5;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
  #[error("模型输出形状不符合预期: {0}")]
  MalformedOutput(String),
}

impl DecodeError {
  pub fn malformed(msg: impl Into<String>) -> Self {
    DecodeError::MalformedOutput(msg.into())
  }
}

/// 解码布局为 `(batch, 4 + 1 + num_classes, num_proposals)` 的检测输出
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoloDecoder {
  conf_threshold: f32,
  num_classes: Option<usize>,
}

impl YoloDecoder {
  /// 类别数量由输出的通道数推断
  pub fn new(conf_threshold: f32) -> Self {
    Self {
      conf_threshold,
      num_classes: None,
    }
  }

  /// 要求输出通道数严格为 `5 + num_classes`
  pub fn with_num_classes(mut self, num_classes: usize) -> Self {
    self.num_classes = Some(num_classes);
    self
  }

  pub fn conf_threshold(&self) -> f32 {
    self.conf_threshold
  }

  /// 校验形状并返回 `(batch, channels, proposals)`
  fn layout(&self, raw: &RawOutput) -> Result<(usize, usize, usize), DecodeError> {
    let &[batch, channels, proposals] = raw.shape() else {
      error!("模型输出维度为 {}, 期望为 3", raw.shape().len());
      return Err(DecodeError::malformed(format!(
        "期望 3 维输出, 实际形状为 {:?}",
        raw.shape()
      )));
    };

    if channels <= CLASS_CHANNEL_OFFSET {
      error!("模型输出通道数 {} 不足以容纳任何类别", channels);
      return Err(DecodeError::malformed(format!(
        "通道数 {} 小于 {}",
        channels,
        CLASS_CHANNEL_OFFSET + 1
      )));
    }

    if let Some(num_classes) = self.num_classes
      && channels != CLASS_CHANNEL_OFFSET + num_classes
    {
      error!(
        "预期模型输出通道数为 {}, 实际为 {}",
        CLASS_CHANNEL_OFFSET + num_classes,
        channels
      );
      return Err(DecodeError::malformed(format!(
        "期望 {} 个通道 (4 + 1 + {}), 实际为 {}",
        CLASS_CHANNEL_OFFSET + num_classes,
        num_classes,
        channels
      )));
    }

    Ok((batch, channels, proposals))
  }

  /// 解码单张图像的输出，批次维度必须为 1
  pub fn decode(&self, raw: &RawOutput) -> Result<Vec<Candidate>, DecodeError> {
    let (batch, channels, proposals) = self.layout(raw)?;
    if batch != 1 {
      return Err(DecodeError::malformed(format!(
        "期望批次大小为 1, 实际为 {}",
        batch
      )));
    }
    Ok(self.decode_image(raw.data(), channels, proposals))
  }

  /// 逐张解码批量输出，各图像之间互不影响
  pub fn decode_batch(&self, raw: &RawOutput) -> Result<Vec<Vec<Candidate>>, DecodeError> {
    let (batch, channels, proposals) = self.layout(raw)?;
    let stride = channels * proposals;

    let results = (0..batch)
      .map(|b| self.decode_image(&raw.data()[b * stride..(b + 1) * stride], channels, proposals))
      .collect();
    Ok(results)
  }

  /// `data` 为单张图像的 `(channels, proposals)` 切片
  fn decode_image(&self, data: &[f32], channels: usize, proposals: usize) -> Vec<Candidate> {
    let at = |c: usize, p: usize| data[c * proposals + p];
    let mut candidates = Vec::new();

    for p in 0..proposals {
      let (class_id, class_score) = {
        let mut best_score = at(CLASS_CHANNEL_OFFSET, p);
        let mut best_idx = 0usize;
        for c in CLASS_CHANNEL_OFFSET + 1..channels {
          let score = at(c, p);
          // 严格大于：并列时保留第一个
          if score > best_score {
            best_score = score;
            best_idx = c - CLASS_CHANNEL_OFFSET;
          }
        }
        (best_idx as u32, best_score)
      };

      let score = at(OBJECTNESS_CHANNEL, p) * class_score;
      if score < self.conf_threshold || score.is_nan() {
        continue;
      }

      let center = CenterBox::new(at(0, p), at(1, p), at(2, p), at(3, p));
      candidates.push(Candidate {
        bbox: center.to_corner(),
        score,
        class_id,
      });
    }

    debug!("{} 个候选框中有 {} 个通过置信度阈值", proposals, candidates.len());
    candidates
  }
}

/// 按置信度阈值解码，类别数量由通道数推断
pub fn decode(raw: &RawOutput, conf_threshold: f32) -> Result<Vec<Candidate>, DecodeError> {
  YoloDecoder::new(conf_threshold).decode(raw)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::geometry::CornerBox;
  use proptest::prelude::*;

  /// 按行（每个候选一行）构造 `(1, channels, n)` 输出
  fn raw_from_rows(rows: &[Vec<f32>]) -> RawOutput {
    let channels = rows.first().map(|r| r.len()).unwrap_or(6);
    let n = rows.len();
    let mut data = vec![0.0f32; channels * n];
    for (p, row) in rows.iter().enumerate() {
      for (c, v) in row.iter().enumerate() {
        data[c * n + p] = *v;
      }
    }
    RawOutput::new(vec![1, channels, n], data).unwrap()
  }

  #[test]
  fn test_decode_two_proposals() {
    let raw = raw_from_rows(&[
      vec![100.0, 100.0, 50.0, 50.0, 0.9, 0.9],
      vec![105.0, 105.0, 50.0, 50.0, 0.8, 0.8],
    ]);
    let candidates = decode(&raw, 0.25).unwrap();
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].bbox, CornerBox::new(75.0, 75.0, 125.0, 125.0));
    assert!((candidates[0].score - 0.81).abs() < 1e-6);
    assert_eq!(candidates[1].bbox, CornerBox::new(80.0, 80.0, 130.0, 130.0));
    assert!((candidates[1].score - 0.64).abs() < 1e-6);
  }

  #[test]
  fn test_decode_keeps_row_order() {
    let raw = raw_from_rows(&[
      vec![10.0, 10.0, 4.0, 4.0, 0.5, 0.6],
      vec![20.0, 20.0, 4.0, 4.0, 1.0, 0.9],
      vec![30.0, 30.0, 4.0, 4.0, 0.1, 0.1],
      vec![40.0, 40.0, 4.0, 4.0, 0.7, 0.7],
    ]);
    let candidates = decode(&raw, 0.25).unwrap();
    let xs: Vec<f32> = candidates.iter().map(|c| c.bbox.x1).collect();
    assert_eq!(xs, vec![8.0, 18.0, 38.0]);
  }

  #[test]
  fn test_argmax_tie_takes_first_index() {
    let raw = raw_from_rows(&[vec![0.0, 0.0, 2.0, 2.0, 1.0, 0.2, 0.7, 0.7, 0.7]]);
    let candidates = decode(&raw, 0.1).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].class_id, 1);
    assert!((candidates[0].score - 0.7).abs() < 1e-6);
  }

  #[test]
  fn test_score_at_threshold_is_kept() {
    let raw = raw_from_rows(&[vec![0.0, 0.0, 2.0, 2.0, 1.0, 0.5]]);
    assert_eq!(decode(&raw, 0.5).unwrap().len(), 1);
  }

  #[test]
  fn test_threshold_above_all_scores() {
    let raw = raw_from_rows(&[
      vec![100.0, 100.0, 50.0, 50.0, 0.9, 0.9],
      vec![105.0, 105.0, 50.0, 50.0, 0.8, 0.8],
    ]);
    assert!(decode(&raw, 0.9).unwrap().is_empty());
  }

  #[test]
  fn test_empty_proposals() {
    let raw = RawOutput::new(vec![1, 84, 0], vec![]).unwrap();
    assert!(decode(&raw, 0.25).unwrap().is_empty());
  }

  #[test]
  fn test_malformed_rank() {
    let raw = RawOutput::new(vec![6, 2], vec![0.0; 12]).unwrap();
    assert!(matches!(decode(&raw, 0.25), Err(DecodeError::MalformedOutput(_))));
  }

  #[test]
  fn test_malformed_channels() {
    let raw = RawOutput::new(vec![1, 5, 2], vec![0.0; 10]).unwrap();
    assert!(matches!(decode(&raw, 0.25), Err(DecodeError::MalformedOutput(_))));

    let raw = RawOutput::new(vec![1, 84, 1], vec![0.0; 84]).unwrap();
    let decoder = YoloDecoder::new(0.25).with_num_classes(80);
    assert!(matches!(decoder.decode(&raw), Err(DecodeError::MalformedOutput(_))));
    let decoder = YoloDecoder::new(0.25).with_num_classes(79);
    assert!(decoder.decode(&raw).unwrap().is_empty());
  }

  #[test]
  fn test_decode_rejects_batch() {
    let raw = RawOutput::new(vec![2, 6, 1], vec![0.0; 12]).unwrap();
    assert!(decode(&raw, 0.25).is_err());
  }

  #[test]
  fn test_decode_batch_is_per_image() {
    // 第一张图一个高分候选，第二张图无
    let data = vec![
      10.0, 10.0, 4.0, 4.0, 0.9, 0.9, // 图像 0
      10.0, 10.0, 4.0, 4.0, 0.1, 0.9, // 图像 1
    ];
    let raw = RawOutput::new(vec![2, 6, 1], data).unwrap();
    let results = YoloDecoder::new(0.25).decode_batch(&raw).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].len(), 1);
    assert!(results[1].is_empty());
  }

  proptest! {
    #[test]
    fn prop_decoder_respects_threshold(
      rows in prop::collection::vec(
        (prop::array::uniform4(0.0f32..640.0), 0.0f32..1.0, prop::collection::vec(0.0f32..1.0, 3)),
        0..64,
      ),
      conf in 0.0f32..1.0,
    ) {
      let rows: Vec<Vec<f32>> = rows
        .into_iter()
        .map(|(b, obj, cls)| b.into_iter().chain([obj]).chain(cls).collect())
        .collect();
      let raw = if rows.is_empty() {
        RawOutput::new(vec![1, 8, 0], vec![]).unwrap()
      } else {
        raw_from_rows(&rows)
      };

      let candidates = decode(&raw, conf).unwrap();
      let expected = rows
        .iter()
        .filter(|r| {
          let best = r[5..].iter().cloned().fold(f32::MIN, f32::max);
          r[4] * best >= conf
        })
        .count();
      prop_assert_eq!(candidates.len(), expected);
      for c in &candidates {
        prop_assert!(c.score >= conf);
        prop_assert!((c.class_id as usize) < 3);
      }
    }
  }
}
