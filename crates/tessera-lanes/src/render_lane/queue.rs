// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tiered render queues and the policy that sorts drawables into them.

use tessera_core::config::{DistanceBand, LodConfig, TierConfig, TierKind};
use tessera_core::scene::{DrawableClass, DrawableHandle, VisibleDrawable};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("tier {tier} does not exist, the queue has {count}")]
    TierOutOfRange { tier: usize, count: usize },
}

/// One bucket of a [`RenderQueue`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueueTier {
    kind: TierKind,
    shadow_level: u8,
    members: Vec<DrawableHandle>,
}

impl QueueTier {
    pub fn kind(&self) -> TierKind {
        self.kind
    }

    /// Shadow cascade this tier casts into, `0` for none.
    pub fn shadow_level(&self) -> u8 {
        self.shadow_level
    }

    pub fn members(&self) -> &[DrawableHandle] {
        &self.members
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// An ordered, fixed set of tiers. Tier order and shadow levels never change
/// after construction; only membership does.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderQueue {
    tiers: Vec<QueueTier>,
    // Tier indices grouped near, mid, far; tier order kept within a band.
    draw_order: Vec<usize>,
}

impl RenderQueue {
    pub fn new(tiers: &[TierConfig]) -> Self {
        let mut draw_order: Vec<usize> = (0..tiers.len()).collect();
        draw_order.sort_by_key(|&i| tiers[i].kind.band());
        Self {
            tiers: tiers
                .iter()
                .map(|t| QueueTier {
                    kind: t.kind,
                    shadow_level: t.shadow_level,
                    members: Vec::new(),
                })
                .collect(),
            draw_order,
        }
    }

    /// Appends `handle` to tier `tier`. Duplicates are not detected.
    pub fn push(&mut self, tier: usize, handle: DrawableHandle) -> Result<(), QueueError> {
        let count = self.tiers.len();
        self.tiers
            .get_mut(tier)
            .ok_or(QueueError::TierOutOfRange { tier, count })?
            .members
            .push(handle);
        Ok(())
    }

    /// Empties every tier, keeping each tier's allocation for the next frame.
    pub fn flush(&mut self) {
        for tier in &mut self.tiers {
            tier.members.clear();
        }
    }

    pub fn tiers(&self) -> &[QueueTier] {
        &self.tiers
    }

    /// Tiers in drawing order: every near tier, then mid, then far.
    pub fn draw_order(&self) -> impl Iterator<Item = &QueueTier> + '_ {
        self.draw_order.iter().map(move |&i| &self.tiers[i])
    }

    pub fn tier(&self, index: usize) -> Option<&QueueTier> {
        self.tiers.get(index)
    }

    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    /// Index of the first tier holding `kind`.
    pub fn tier_index(&self, kind: TierKind) -> Option<usize> {
        self.tiers.iter().position(|t| t.kind == kind)
    }

    pub fn shadow_levels(&self) -> Vec<u8> {
        self.tiers.iter().map(|t| t.shadow_level).collect()
    }

    /// Total members across all tiers.
    pub fn member_count(&self) -> usize {
        self.tiers.iter().map(|t| t.members.len()).sum()
    }

    /// Member capacity across all tiers.
    pub fn capacity(&self) -> usize {
        self.tiers.iter().map(|t| t.members.capacity()).sum()
    }

    /// Members of every tier that casts into cascade `level`, in tier order.
    pub fn shadow_casters(&self, level: u8) -> impl Iterator<Item = DrawableHandle> + '_ {
        self.tiers
            .iter()
            .filter(move |t| level != 0 && t.shadow_level == level)
            .flat_map(|t| t.members.iter().copied())
    }
}

/// Assigns drawables to tiers from their class and distance.
#[derive(Debug, Clone)]
pub struct TierPolicy {
    lod: LodConfig,
    index: Vec<(TierKind, usize)>,
    fallback: Option<usize>,
}

impl TierPolicy {
    pub fn new(lod: LodConfig, tiers: &[TierConfig]) -> Self {
        let mut index: Vec<(TierKind, usize)> = Vec::with_capacity(tiers.len());
        for (i, tier) in tiers.iter().enumerate() {
            if !index.iter().any(|(kind, _)| *kind == tier.kind) {
                index.push((tier.kind, i));
            }
        }
        let fallback = index
            .iter()
            .find(|(kind, _)| *kind == TierKind::Unshadowed)
            .map(|(_, i)| *i);
        Self {
            lod,
            index,
            fallback,
        }
    }

    /// How far the near and mid bands are pushed out at camera `speed`.
    pub fn near_boost(&self, speed: f32) -> f32 {
        (speed * self.lod.velocity_scale).clamp(0.0, self.lod.max_velocity_boost)
    }

    /// The tier kind `drawable` belongs in when the camera moves at `speed`.
    pub fn classify(&self, drawable: &VisibleDrawable, speed: f32) -> TierKind {
        if !drawable.casts_shadow {
            return TierKind::Unshadowed;
        }
        let boost = self.near_boost(speed);
        let band = if drawable.distance < self.lod.mid_distance + boost {
            DistanceBand::Near
        } else if drawable.distance < self.lod.low_distance + boost {
            DistanceBand::Mid
        } else {
            DistanceBand::Far
        };
        match (drawable.class, band) {
            (DrawableClass::Dynamic, _) => TierKind::DynamicNear,
            (DrawableClass::Static, DistanceBand::Near) => TierKind::StaticNear,
            (DrawableClass::Static, DistanceBand::Mid) => TierKind::StaticMid,
            (DrawableClass::Static, DistanceBand::Far) => TierKind::StaticFar,
            (DrawableClass::Animated, DistanceBand::Near) => TierKind::AnimatedNear,
            (DrawableClass::Animated, DistanceBand::Mid) => TierKind::AnimatedMid,
            (DrawableClass::Animated, DistanceBand::Far) => TierKind::AnimatedFar,
        }
    }

    /// The queue tier index for `drawable`. Kinds the queue has no tier for
    /// land in the unshadowed tier, if there is one.
    pub fn tier_for(&self, drawable: &VisibleDrawable, speed: f32) -> Option<usize> {
        let kind = self.classify(drawable, speed);
        self.index
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, i)| *i)
            .or(self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::config::PipelineConfig;

    fn drawable(class: DrawableClass, distance: f32) -> VisibleDrawable {
        VisibleDrawable {
            handle: DrawableHandle(1),
            class,
            distance,
            casts_shadow: true,
        }
    }

    #[test]
    fn test_flush_keeps_tiers_and_capacity() {
        let config = PipelineConfig::default();
        let mut queue = RenderQueue::new(&config.tiers);
        for i in 0..32 {
            queue.push(i % 3, DrawableHandle(i as u64)).unwrap();
        }
        assert_eq!(queue.member_count(), 32);
        let capacity = queue.capacity();

        queue.flush();
        assert_eq!(queue.member_count(), 0);
        assert_eq!(queue.capacity(), capacity);
        assert_eq!(queue.shadow_levels(), config.shadow_levels());
    }

    #[test]
    fn test_second_flush_changes_nothing() {
        let config = PipelineConfig::default();
        let mut queue = RenderQueue::new(&config.tiers);
        for i in 0..20 {
            queue.push(i % 8, DrawableHandle(i as u64)).unwrap();
        }
        queue.flush();
        let once = queue.clone();
        let capacity = queue.capacity();

        queue.flush();
        assert_eq!(queue, once);
        assert_eq!(queue.capacity(), capacity);
        assert_eq!(queue.member_count(), 0);
        assert_eq!(queue.shadow_levels(), config.shadow_levels());
        assert!(queue.tiers().iter().all(QueueTier::is_empty));
    }

    #[test]
    fn test_draw_order_groups_bands_near_to_far() {
        let config = PipelineConfig::default();
        let queue = RenderQueue::new(&config.tiers);
        let kinds: Vec<TierKind> = queue.draw_order().map(QueueTier::kind).collect();
        assert_eq!(
            kinds,
            vec![
                TierKind::DynamicNear,
                TierKind::StaticNear,
                TierKind::AnimatedNear,
                TierKind::Unshadowed,
                TierKind::StaticMid,
                TierKind::AnimatedMid,
                TierKind::StaticFar,
                TierKind::AnimatedFar,
            ]
        );
        assert_eq!(queue.draw_order().count(), queue.tier_count());
    }

    #[test]
    fn test_push_appends_in_order_without_dedup() {
        let mut queue = RenderQueue::new(&PipelineConfig::default().tiers);
        queue.push(1, DrawableHandle(5)).unwrap();
        queue.push(1, DrawableHandle(2)).unwrap();
        queue.push(1, DrawableHandle(5)).unwrap();
        assert_eq!(
            queue.tier(1).unwrap().members(),
            &[DrawableHandle(5), DrawableHandle(2), DrawableHandle(5)]
        );
        assert_eq!(
            queue.push(8, DrawableHandle(0)),
            Err(QueueError::TierOutOfRange { tier: 8, count: 8 })
        );
    }

    #[test]
    fn test_shadow_casters_by_level() {
        let mut queue = RenderQueue::new(&PipelineConfig::default().tiers);
        queue.push(0, DrawableHandle(1)).unwrap();
        queue.push(1, DrawableHandle(2)).unwrap();
        queue.push(2, DrawableHandle(3)).unwrap();
        queue.push(7, DrawableHandle(4)).unwrap();
        let near: Vec<_> = queue.shadow_casters(1).collect();
        assert_eq!(near, vec![DrawableHandle(1), DrawableHandle(2)]);
        assert_eq!(queue.shadow_casters(0).count(), 0);
    }

    #[test]
    fn test_policy_bands() {
        let config = PipelineConfig::default();
        let policy = TierPolicy::new(config.lod, &config.tiers);
        assert_eq!(
            policy.classify(&drawable(DrawableClass::Static, 10.0), 0.0),
            TierKind::StaticNear
        );
        assert_eq!(
            policy.classify(&drawable(DrawableClass::Static, 60.0), 0.0),
            TierKind::StaticMid
        );
        assert_eq!(
            policy.classify(&drawable(DrawableClass::Animated, 500.0), 0.0),
            TierKind::AnimatedFar
        );
        assert_eq!(
            policy.classify(&drawable(DrawableClass::Dynamic, 500.0), 0.0),
            TierKind::DynamicNear
        );

        let mut hidden = drawable(DrawableClass::Static, 1.0);
        hidden.casts_shadow = false;
        assert_eq!(policy.tier_for(&hidden, 0.0), Some(7));
    }

    #[test]
    fn test_camera_speed_widens_near_band() {
        let config = PipelineConfig::default();
        let policy = TierPolicy::new(config.lod, &config.tiers);
        let rock = drawable(DrawableClass::Static, 70.0);
        assert_eq!(policy.classify(&rock, 0.0), TierKind::StaticMid);
        assert_eq!(policy.classify(&rock, 30.0), TierKind::StaticNear);
        approx::assert_relative_eq!(policy.near_boost(10.0), 5.0);
        approx::assert_relative_eq!(policy.near_boost(1000.0), config.lod.max_velocity_boost);
    }

    #[test]
    fn test_missing_kind_falls_back_to_unshadowed() {
        let tiers = [
            TierConfig::new(TierKind::StaticNear, 1),
            TierConfig::new(TierKind::Unshadowed, 0),
        ];
        let policy = TierPolicy::new(LodConfig::default(), &tiers);
        assert_eq!(
            policy.tier_for(&drawable(DrawableClass::Animated, 10.0), 0.0),
            Some(1)
        );
        let bare = TierPolicy::new(LodConfig::default(), &tiers[..1]);
        assert_eq!(bare.tier_for(&drawable(DrawableClass::Animated, 10.0), 0.0), None);
    }
}
