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

//! The double-buffered queue pair that hands a frame's sorted drawables
//! from scene traversal to submission.

use super::RenderQueue;
use tessera_core::config::TierConfig;

/// A double-buffered pair of [`RenderQueue`]s.
///
/// The producer fills [`next_mut`](Self::next_mut) while the consumer reads
/// [`current`](Self::current). [`swap`](Self::swap) is the only hand-off
/// point and must not overlap with either side's work.
#[derive(Debug, Clone)]
pub struct FrameQueueSet {
    label: &'static str,
    queues: [RenderQueue; 2],
    current: usize,
    swaps: u64,
}

impl FrameQueueSet {
    pub fn new(label: &'static str, tiers: &[TierConfig]) -> Self {
        Self {
            label,
            queues: [RenderQueue::new(tiers), RenderQueue::new(tiers)],
            current: 0,
            swaps: 0,
        }
    }

    /// The queue being consumed this frame.
    pub fn current(&self) -> &RenderQueue {
        &self.queues[self.current]
    }

    /// The queue being filled for the next frame.
    pub fn next(&self) -> &RenderQueue {
        &self.queues[1 - self.current]
    }

    pub fn next_mut(&mut self) -> &mut RenderQueue {
        &mut self.queues[1 - self.current]
    }

    /// Promotes `next` to `current` and flushes the new `next`, which is the
    /// queue consumed last frame.
    pub fn swap(&mut self) {
        self.current = 1 - self.current;
        self.swaps += 1;
        self.queues[1 - self.current].flush();
        log::trace!(
            "FrameQueueSet '{}': swap #{}, {} drawables current",
            self.label,
            self.swaps,
            self.current().member_count()
        );
    }

    pub fn swap_count(&self) -> u64 {
        self.swaps
    }

    pub fn label(&self) -> &str {
        self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::config::TierKind;
    use tessera_core::scene::DrawableHandle;

    fn seven_tiers() -> Vec<TierConfig> {
        [1, 1, 2, 3, 1, 2, 3]
            .into_iter()
            .map(|level| TierConfig::new(TierKind::StaticNear, level))
            .collect()
    }

    #[test]
    fn test_swap_exchanges_roles() {
        let mut set = FrameQueueSet::new("main", &seven_tiers());
        set.next_mut().push(0, DrawableHandle(1)).unwrap();
        set.swap();
        assert_eq!(set.current().tier(0).unwrap().members(), &[DrawableHandle(1)]);
        assert_eq!(set.next().member_count(), 0);
        assert_eq!(set.swap_count(), 1);
    }

    #[test]
    fn test_swap_flushes_the_stale_queue() {
        let mut set = FrameQueueSet::new("main", &seven_tiers());
        set.next_mut().push(2, DrawableHandle(1)).unwrap();
        set.swap();
        set.next_mut().push(3, DrawableHandle(2)).unwrap();
        set.swap();
        // The queue that held handle 1 is next again, and empty.
        assert_eq!(set.next().member_count(), 0);
        assert_eq!(set.current().tier(3).unwrap().members(), &[DrawableHandle(2)]);
    }

    #[test]
    fn test_shadow_levels_survive_swaps() {
        let mut set = FrameQueueSet::new("main", &seven_tiers());
        for frame in 0..5u64 {
            for tier in 0..7 {
                set.next_mut().push(tier, DrawableHandle(frame)).unwrap();
            }
            set.swap();
            assert_eq!(set.current().shadow_levels(), vec![1, 1, 2, 3, 1, 2, 3]);
            assert_eq!(set.next().shadow_levels(), vec![1, 1, 2, 3, 1, 2, 3]);
        }
    }
}
