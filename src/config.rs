// 该文件是 PyLab Detect （检测后处理） 项目的一部分。
// src/config.rs - 检测参数配置
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

use std::{fmt, str::FromStr};

use clap::Args;
use thiserror::Error;

pub const DEFAULT_INPUT_WIDTH: u32 = 640;
pub const DEFAULT_INPUT_HEIGHT: u32 = 640;
pub const DEFAULT_CONF_THRESHOLD: f32 = 0.25;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
  #[error("输入尺寸格式错误: {0}，应为 <宽>x<高>")]
  InputSizeFormat(String),
  #[error("输入尺寸不能为 0: {0}")]
  ZeroInputSize(InputSize),
  #[error("{name} 阈值超出范围 [0, 1]: {value}")]
  ThresholdOutOfRange { name: &'static str, value: f32 },
}

/// 模型输入尺寸（宽 x 高）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSize {
  pub width: u32,
  pub height: u32,
}

impl InputSize {
  pub const fn new(width: u32, height: u32) -> Self {
    Self { width, height }
  }
}

impl Default for InputSize {
  fn default() -> Self {
    Self::new(DEFAULT_INPUT_WIDTH, DEFAULT_INPUT_HEIGHT)
  }
}

impl fmt::Display for InputSize {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}x{}", self.width, self.height)
  }
}

impl FromStr for InputSize {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (w, h) = s
      .trim()
      .split_once(['x', 'X'])
      .ok_or_else(|| ConfigError::InputSizeFormat(s.to_string()))?;
    let width = w
      .trim()
      .parse()
      .map_err(|_| ConfigError::InputSizeFormat(s.to_string()))?;
    let height = h
      .trim()
      .parse()
      .map_err(|_| ConfigError::InputSizeFormat(s.to_string()))?;
    Ok(Self { width, height })
  }
}

/// 检测流水线使用的全部参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectConfig {
  pub input_size: InputSize,
  pub conf_threshold: f32,
  pub iou_threshold: f32,
}

impl Default for DetectConfig {
  fn default() -> Self {
    Self {
      input_size: InputSize::default(),
      conf_threshold: DEFAULT_CONF_THRESHOLD,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
    }
  }
}

impl DetectConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.input_size.width == 0 || self.input_size.height == 0 {
      return Err(ConfigError::ZeroInputSize(self.input_size));
    }
    check_threshold("置信度", self.conf_threshold)?;
    check_threshold("IoU", self.iou_threshold)?;
    Ok(())
  }
}

fn check_threshold(name: &'static str, value: f32) -> Result<(), ConfigError> {
  if (0.0..=1.0).contains(&value) {
    Ok(())
  } else {
    Err(ConfigError::ThresholdOutOfRange { name, value })
  }
}

/// 各个命令共用的检测参数
#[derive(Args, Debug, Clone)]
pub struct DetectArgs {
  /// 模型输入尺寸，例如 640x640
  #[arg(long, default_value_t = InputSize::default(), value_name = "WxH")]
  pub input_size: InputSize,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_CONF_THRESHOLD, value_name = "THRESHOLD")]
  pub conf: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_IOU_THRESHOLD, value_name = "THRESHOLD")]
  pub iou: f32,
}

impl TryFrom<&DetectArgs> for DetectConfig {
  type Error = ConfigError;

  fn try_from(args: &DetectArgs) -> Result<Self, Self::Error> {
    let config = DetectConfig {
      input_size: args.input_size,
      conf_threshold: args.conf,
      iou_threshold: args.iou,
    };
    config.validate()?;
    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser, Debug)]
  struct TestCli {
    #[command(flatten)]
    detect: DetectArgs,
  }

  #[test]
  fn test_defaults() {
    let config = DetectConfig::default();
    assert_eq!(config.input_size, InputSize::new(640, 640));
    assert_eq!(config.conf_threshold, 0.25);
    assert_eq!(config.iou_threshold, 0.45);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_parse_input_size() {
    assert_eq!("320x256".parse::<InputSize>(), Ok(InputSize::new(320, 256)));
    assert_eq!("1280X720".parse::<InputSize>(), Ok(InputSize::new(1280, 720)));
    assert!("640".parse::<InputSize>().is_err());
    assert!("ax640".parse::<InputSize>().is_err());
  }

  #[test]
  fn test_validate_rejects_bad_values() {
    let config = DetectConfig {
      conf_threshold: 1.5,
      ..Default::default()
    };
    assert!(matches!(
      config.validate(),
      Err(ConfigError::ThresholdOutOfRange { value, .. }) if value == 1.5
    ));

    let config = DetectConfig {
      input_size: InputSize::new(0, 640),
      ..Default::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::ZeroInputSize(_))));

    let config = DetectConfig {
      iou_threshold: f32::NAN,
      ..Default::default()
    };
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_args_into_config() {
    let cli = TestCli::parse_from(["test"]);
    let config = DetectConfig::try_from(&cli.detect).unwrap();
    assert_eq!(config, DetectConfig::default());

    let cli = TestCli::parse_from(["test", "--input-size", "320x320", "--conf", "0.5", "--iou", "0.6"]);
    let config = DetectConfig::try_from(&cli.detect).unwrap();
    assert_eq!(config.input_size, InputSize::new(320, 320));
    assert_eq!(config.conf_threshold, 0.5);
    assert_eq!(config.iou_threshold, 0.6);
  }
}
