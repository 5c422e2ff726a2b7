// 该文件是 PyLab Detect （检测后处理） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

use tracing::debug;

use crate::{geometry::iou, model::Candidate};

/// 贪心 NMS，只看几何位置与置信度，忽略类别
///
/// 输出按选中顺序排列：置信度降序，同分保持输入顺序。
pub fn suppress(candidates: &[Candidate], iou_threshold: f32) -> Vec<Candidate> {
  greedy(candidates, iou_threshold, |_, _| true)
}

/// 按类别分别做 NMS：只抑制同类别的候选
pub fn suppress_per_class(candidates: &[Candidate], iou_threshold: f32) -> Vec<Candidate> {
  greedy(candidates, iou_threshold, |a, b| a.class_id == b.class_id)
}

fn greedy<F>(candidates: &[Candidate], iou_threshold: f32, competes: F) -> Vec<Candidate>
where
  F: Fn(&Candidate, &Candidate) -> bool,
{
  // sort_by 是稳定排序
  let mut order: Vec<usize> = (0..candidates.len()).collect();
  order.sort_by(|&a, &b| candidates[b].score.total_cmp(&candidates[a].score));

  let mut suppressed = vec![false; candidates.len()];
  let mut kept = Vec::new();

  for (pos, &k) in order.iter().enumerate() {
    if suppressed[k] {
      continue;
    }
    let best = &candidates[k];
    kept.push(*best);

    for &j in &order[pos + 1..] {
      if suppressed[j] {
        continue;
      }
      let other = &candidates[j];
      if competes(best, other) && iou(&best.bbox, &other.bbox) >= iou_threshold {
        suppressed[j] = true;
      }
    }
  }

  debug!("NMS: {} 个候选保留 {} 个", candidates.len(), kept.len());
  kept
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::geometry::{CenterBox, CornerBox};
  use proptest::prelude::*;

  fn candidate(bbox: [f32; 4], score: f32, class_id: u32) -> Candidate {
    Candidate {
      bbox: CornerBox::from(bbox),
      score,
      class_id,
    }
  }

  #[test]
  fn test_empty() {
    assert!(suppress(&[], 0.45).is_empty());
  }

  #[test]
  fn test_overlapping_pair_keeps_highest() {
    let a = Candidate {
      bbox: CenterBox::new(100.0, 100.0, 50.0, 50.0).to_corner(),
      score: 0.81,
      class_id: 0,
    };
    let b = Candidate {
      bbox: CenterBox::new(105.0, 105.0, 50.0, 50.0).to_corner(),
      score: 0.64,
      class_id: 0,
    };
    // B 在前也一样
    let kept = suppress(&[b, a], 0.45);
    assert_eq!(kept, vec![a]);
  }

  #[test]
  fn test_sorted_by_score_and_stable() {
    let c0 = candidate([0.0, 0.0, 10.0, 10.0], 0.5, 0);
    let c1 = candidate([100.0, 0.0, 110.0, 10.0], 0.9, 0);
    let c2 = candidate([200.0, 0.0, 210.0, 10.0], 0.5, 0);
    let c3 = candidate([300.0, 0.0, 310.0, 10.0], 0.7, 0);
    let kept = suppress(&[c0, c1, c2, c3], 0.45);
    assert_eq!(kept, vec![c1, c3, c0, c2]);
  }

  #[test]
  fn test_equal_scores_first_input_wins() {
    let first = candidate([0.0, 0.0, 10.0, 10.0], 0.6, 0);
    let second = candidate([1.0, 1.0, 11.0, 11.0], 0.6, 1);
    assert_eq!(suppress(&[first, second], 0.45), vec![first]);
    assert_eq!(suppress(&[second, first], 0.45), vec![second]);
  }

  #[test]
  fn test_iou_equal_to_threshold_is_suppressed() {
    let a = candidate([0.0, 0.0, 10.0, 10.0], 0.9, 0);
    // 交集 50，并集 150，IoU = 1/3
    let b = candidate([5.0, 0.0, 15.0, 10.0], 0.8, 0);
    let threshold = iou(&a.bbox, &b.bbox);
    assert_eq!(suppress(&[a, b], threshold), vec![a]);
    assert_eq!(suppress(&[a, b], threshold + 1e-3), vec![a, b]);
  }

  #[test]
  fn test_suppressed_candidate_does_not_suppress() {
    // a 抑制 b；b 与 c 重叠但 a 与 c 不重叠，c 必须保留
    let a = candidate([0.0, 0.0, 10.0, 10.0], 0.9, 0);
    let b = candidate([4.0, 0.0, 14.0, 10.0], 0.8, 0);
    let c = candidate([9.0, 0.0, 19.0, 10.0], 0.7, 0);
    assert_eq!(suppress(&[a, b, c], 0.3), vec![a, c]);
  }

  #[test]
  fn test_global_ignores_class() {
    let a = candidate([0.0, 0.0, 10.0, 10.0], 0.9, 0);
    let b = candidate([0.0, 0.0, 10.0, 10.0], 0.8, 1);
    assert_eq!(suppress(&[a, b], 0.45), vec![a]);
    assert_eq!(suppress_per_class(&[a, b], 0.45), vec![a, b]);
  }

  #[test]
  fn test_per_class_suppresses_same_class() {
    let a = candidate([0.0, 0.0, 10.0, 10.0], 0.9, 2);
    let b = candidate([1.0, 1.0, 10.0, 10.0], 0.8, 2);
    let c = candidate([0.0, 0.0, 10.0, 10.0], 0.7, 3);
    assert_eq!(suppress_per_class(&[a, b, c], 0.45), vec![a, c]);
  }

  fn arb_candidates() -> impl Strategy<Value = Vec<Candidate>> {
    prop::collection::vec(
      (0.0f32..200.0, 0.0f32..200.0, 1.0f32..80.0, 1.0f32..80.0, 0.0f32..1.0, 0u32..3),
      0..40,
    )
    .prop_map(|items| {
      items
        .into_iter()
        .map(|(x, y, w, h, score, class_id)| candidate([x, y, x + w, y + h], score, class_id))
        .collect()
    })
  }

  proptest! {
    #[test]
    fn prop_suppress_invariants(candidates in arb_candidates(), threshold in 0.05f32..1.0) {
      let kept = suppress(&candidates, threshold);

      for k in &kept {
        prop_assert!(candidates.contains(k));
      }
      for pair in kept.windows(2) {
        prop_assert!(pair[0].score >= pair[1].score);
      }
      for (i, a) in kept.iter().enumerate() {
        for b in &kept[i + 1..] {
          prop_assert!(iou(&a.bbox, &b.bbox) < threshold);
        }
      }

      // 每个被丢弃的候选都被某个分数不低于它的保留框覆盖
      for c in &candidates {
        if !kept.contains(c) {
          prop_assert!(kept.iter().any(|k| k.score >= c.score && iou(&k.bbox, &c.bbox) >= threshold));
        }
      }
    }

    #[test]
    fn prop_suppress_idempotent(candidates in arb_candidates(), threshold in 0.05f32..1.0) {
      let once = suppress(&candidates, threshold);
      let twice = suppress(&once, threshold);
      prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_per_class_invariants(candidates in arb_candidates(), threshold in 0.05f32..1.0) {
      let kept = suppress_per_class(&candidates, threshold);
      for (i, a) in kept.iter().enumerate() {
        for b in &kept[i + 1..] {
          prop_assert!(a.class_id != b.class_id || iou(&a.bbox, &b.bbox) < threshold);
        }
      }
      for k in &kept {
        prop_assert!(candidates.contains(k));
      }
    }
  }
}
