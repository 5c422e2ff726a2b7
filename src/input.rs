// 该文件是 PyLab Detect （检测后处理） 项目的一部分。
// src/input.rs - 图像输入
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

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, url_path};

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

#[derive(Error, Debug)]
pub enum InputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像无效 {path}: {source}")]
  InvalidImage {
    path: String,
    source: image::ImageError,
  },
  #[error("图像为空: {0}")]
  EmptyImage(String),
}

/// 带来源名称的图像
#[derive(Debug, Clone)]
pub struct NamedImage {
  pub name: String,
  pub image: RgbImage,
}

/// 读取并解码一张图像
pub fn read_image(path: &Path) -> Result<RgbImage, InputError> {
  let invalid = |source| InputError::InvalidImage {
    path: path.display().to_string(),
    source,
  };
  let image = ImageReader::open(path)?
    .with_guessed_format()?
    .decode()
    .map_err(invalid)?
    .to_rgb8();

  if image.width() == 0 || image.height() == 0 {
    return Err(InputError::EmptyImage(path.display().to_string()));
  }
  debug!("读取图像 {}: {}x{}", path.display(), image.width(), image.height());
  Ok(image)
}

fn image_name(path: &Path) -> String {
  path
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_else(|| "frame".to_string())
}

fn check_scheme<T: FromUrlWithScheme>(url: &Url) -> Result<(), InputError> {
  if url.scheme() != T::SCHEME {
    error!(
      "URI scheme mismatch: expected '{}', found '{}'",
      T::SCHEME,
      url.scheme()
    );
    return Err(InputError::SchemeMismatch(url.scheme().to_string()));
  }
  Ok(())
}

/// 单个图像文件：`image:///path/to/image.jpg`
///
/// 文件在迭代时才解码，解码失败作为该项的错误返回。
pub struct ImageFileInput {
  path: Option<PathBuf>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    check_scheme::<Self>(url)?;
    Ok(ImageFileInput {
      path: Some(PathBuf::from(url_path(url))),
    })
  }
}

impl Iterator for ImageFileInput {
  type Item = Result<NamedImage, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.path.take()?;
    Some(read_image(&path).map(|image| NamedImage {
      name: image_name(&path),
      image,
    }))
  }
}

/// 目录下的全部图像文件，按文件名排序：`folder:///path/to/dir`
pub struct DirectoryInput {
  files: std::vec::IntoIter<PathBuf>,
}

impl FromUrlWithScheme for DirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    check_scheme::<Self>(url)?;
    DirectoryInput::open(Path::new(&url_path(url)))
  }
}

impl DirectoryInput {
  pub fn open(directory: &Path) -> Result<Self, InputError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(directory)? {
      let path = entry?.path();
      let is_image = path
        .extension()
        .map(|ext| {
          let ext = ext.to_string_lossy().to_lowercase();
          IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false);
      if path.is_file() && is_image {
        files.push(path);
      }
    }
    files.sort();
    debug!("目录 {} 中找到 {} 张图像", directory.display(), files.len());

    Ok(DirectoryInput {
      files: files.into_iter(),
    })
  }

  pub fn remaining(&self) -> usize {
    self.files.len()
  }
}

impl Iterator for DirectoryInput {
  type Item = Result<NamedImage, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.files.next()?;
    Some(read_image(&path).map(|image| NamedImage {
      name: image_name(&path),
      image,
    }))
  }
}

pub enum InputWrapper {
  ReadImageFile(ImageFileInput),
  Directory(DirectoryInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ImageFileInput::SCHEME => Ok(InputWrapper::ReadImageFile(ImageFileInput::from_url(url)?)),
      DirectoryInput::SCHEME => Ok(InputWrapper::Directory(DirectoryInput::from_url(url)?)),
      other => Err(InputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = Result<NamedImage, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::ReadImageFile(input) => input.next(),
      InputWrapper::Directory(input) => input.next(),
    }
  }
}
