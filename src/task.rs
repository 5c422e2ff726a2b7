// 该文件是 PyLab Detect （检测后处理） 项目的一部分。
// src/task.rs - 推理任务
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

use anyhow::Context;
use tracing::{info, warn};

use crate::{
  input::{InputError, NamedImage},
  model::{Detector, Model},
  output::Render,
};

pub trait Task<I, M, O>: Sized {
  type Output;
  fn run_task(self, input: I, detector: &Detector<M>, output: &O) -> anyhow::Result<Self::Output>;
}

/// 只处理第一张输入图像，任何错误都直接返回
pub struct OneShotTask;

impl<I, M, O> Task<I, M, O> for OneShotTask
where
  I: Iterator<Item = Result<NamedImage, InputError>>,
  M: Model,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Output = usize;

  fn run_task(self, mut input: I, detector: &Detector<M>, output: &O) -> anyhow::Result<usize> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))??;
    info!("输入帧获取成功，开始推理...");

    let now = std::time::Instant::now();
    let detections = detector
      .detect(&frame.image)
      .with_context(|| format!("检测失败: {}", frame.name))?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());

    for item in detections.result.iter() {
      info!(
        "  - 类别 {}: {:.2} at ({:.0}, {:.0}, {:.0}, {:.0})",
        item.class_id, item.score, item.bbox.x1, item.bbox.y1, item.bbox.x2, item.bbox.y2
      );
    }

    output.render_result(&frame.name, &detections)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(detections.result.len())
  }
}

/// 批量任务的统计结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
  pub processed: usize,
  pub failed: Vec<String>,
  pub detections: usize,
}

/// 逐张处理全部输入；单张图像失败只记录，不影响其它图像
#[derive(Debug, Default)]
pub struct BatchTask {
  max_images: Option<usize>,
}

impl BatchTask {
  pub fn with_max_images(mut self, max_images: Option<usize>) -> Self {
    self.max_images = max_images;
    self
  }
}

impl<I, M, O> Task<I, M, O> for BatchTask
where
  I: Iterator<Item = Result<NamedImage, InputError>>,
  M: Model,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Output = BatchSummary;

  fn run_task(self, input: I, detector: &Detector<M>, output: &O) -> anyhow::Result<BatchSummary> {
    if !output.keeps_every_frame() {
      anyhow::bail!("批量任务的输出会被逐帧覆盖, 请使用 folder:// 输出");
    }

    info!("开始批量任务...");
    let mut summary = BatchSummary::default();

    for (index, frame) in input.enumerate() {
      if self.max_images.is_some_and(|n| index >= n) {
        info!("达到指定图像数 {}, 退出任务循环", index);
        break;
      }

      let frame = match frame {
        Ok(frame) => frame,
        Err(e) => {
          warn!("第 {} 张图像读取失败: {}", index, e);
          summary.failed.push(format!("#{}", index));
          continue;
        }
      };

      match run_one(&frame, detector, output) {
        Ok(count) => {
          info!("{}: 检测到 {} 个物体", frame.name, count);
          summary.processed += 1;
          summary.detections += count;
        }
        Err(e) => {
          warn!("{} 处理失败: {:#}", frame.name, e);
          summary.failed.push(frame.name.clone());
        }
      }
    }

    info!(
      "任务完成: 成功 {} 张, 失败 {} 张, 共 {} 个检测结果",
      summary.processed,
      summary.failed.len(),
      summary.detections
    );
    Ok(summary)
  }
}

fn run_one<M, O>(frame: &NamedImage, detector: &Detector<M>, output: &O) -> anyhow::Result<usize>
where
  M: Model,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  let detections = detector.detect(&frame.image)?;
  output.render_result(&frame.name, &detections)?;
  Ok(detections.result.len())
}
