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

//! Pipeline configuration, fixed at construction and loadable from RON.

use crate::renderer::api::{DeviceLimits, TextureFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// Target names that filter inputs can reference besides earlier filters.
pub const BUILTIN_TARGETS: [&str; 5] = ["scene.color0", "scene.depth", "deferred", "water", "reflect"];

/// An error raised while loading or validating a [`PipelineConfig`].
#[derive(Debug)]
pub enum ConfigError {
    /// The RON text could not be parsed.
    Parse(String),
    /// The config file could not be read.
    Io(std::io::Error),
    /// The config parsed but breaks a construction-time rule.
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse(msg) => write!(f, "Failed to parse pipeline config: {msg}"),
            ConfigError::Io(err) => write!(f, "Failed to read pipeline config: {err}"),
            ConfigError::Invalid(msg) => write!(f, "Invalid pipeline config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

/// The bucket a tier holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TierKind {
    /// Moving objects, always treated as near.
    DynamicNear,
    /// Static objects closer than `mid_distance`.
    StaticNear,
    /// Static objects between `mid_distance` and `low_distance`.
    StaticMid,
    /// Static objects beyond `low_distance`.
    StaticFar,
    /// Animated objects closer than `mid_distance`.
    AnimatedNear,
    /// Animated objects between the bands.
    AnimatedMid,
    /// Animated objects beyond `low_distance`.
    AnimatedFar,
    /// Objects that never cast shadows.
    Unshadowed,
}

impl TierKind {
    /// The distance band the tier draws with. Non-casters sit at any
    /// distance and draw with the near band.
    pub fn band(self) -> DistanceBand {
        match self {
            TierKind::DynamicNear
            | TierKind::StaticNear
            | TierKind::AnimatedNear
            | TierKind::Unshadowed => DistanceBand::Near,
            TierKind::StaticMid | TierKind::AnimatedMid => DistanceBand::Mid,
            TierKind::StaticFar | TierKind::AnimatedFar => DistanceBand::Far,
        }
    }
}

/// LOD distance band, ordered near to far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DistanceBand {
    /// Closer than `mid_distance`.
    Near,
    /// Between `mid_distance` and `low_distance`.
    Mid,
    /// Beyond `low_distance`.
    Far,
}

/// One tier of a render queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierConfig {
    /// What the tier holds.
    pub kind: TierKind,
    /// Shadow cascade the tier casts into. `0` means none.
    pub shadow_level: u8,
}

impl TierConfig {
    /// Shorthand constructor.
    pub const fn new(kind: TierKind, shadow_level: u8) -> Self {
        Self { kind, shadow_level }
    }
}

/// Distance bands for LOD tiering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodConfig {
    /// Start of the mid band.
    pub mid_distance: f32,
    /// Start of the far band.
    pub low_distance: f32,
    /// How far camera speed pushes the bands outward, per unit of speed.
    pub velocity_scale: f32,
    /// Upper bound on the speed-driven push.
    pub max_velocity_boost: f32,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            mid_distance: 60.0,
            low_distance: 200.0,
            velocity_scale: 0.5,
            max_velocity_boost: 40.0,
        }
    }
}

/// Vertex attribute slots and storage binding points used by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotLayout {
    /// Vertex positions.
    pub position: u32,
    /// Vertex normals.
    pub normal: u32,
    /// Texture coordinates.
    pub texcoord: u32,
    /// Per-vertex texture array index.
    pub texid: u32,
    /// Vertex colors.
    pub color: u32,
    /// Vertex tangents.
    pub tangent: u32,
    /// Per-chunk bounds read by the cull dispatch.
    pub chunk_records: u32,
    /// Source index data the chunk ranges point into.
    pub chunk_ranges: u32,
    /// The indirect draw record accumulated by the cull dispatch.
    pub indirect: u32,
    /// The compacted output index buffer written by the cull dispatch.
    pub output_indices: u32,
}

impl Default for SlotLayout {
    fn default() -> Self {
        Self {
            position: 0,
            normal: 1,
            texcoord: 2,
            texid: 3,
            color: 4,
            tangent: 5,
            chunk_records: 1,
            chunk_ranges: 2,
            indirect: 3,
            output_indices: 4,
        }
    }
}

impl SlotLayout {
    /// The vertex attribute slots, in declaration order.
    pub fn attribute_slots(&self) -> [u32; 6] {
        [
            self.position,
            self.normal,
            self.texcoord,
            self.texid,
            self.color,
            self.tangent,
        ]
    }

    /// The storage binding points, in declaration order.
    pub fn storage_bindings(&self) -> [u32; 4] {
        [
            self.chunk_records,
            self.chunk_ranges,
            self.indirect,
            self.output_indices,
        ]
    }

    /// Checks for collisions within each namespace.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(slot) = first_duplicate(&self.attribute_slots()) {
            return Err(ConfigError::Invalid(format!(
                "vertex attribute slot {slot} is assigned twice"
            )));
        }
        if let Some(binding) = first_duplicate(&self.storage_bindings()) {
            return Err(ConfigError::Invalid(format!(
                "storage binding {binding} is assigned twice"
            )));
        }
        Ok(())
    }

    /// Checks that every slot fits the device.
    pub fn validate_against(&self, limits: &DeviceLimits) -> Result<(), ConfigError> {
        self.validate()?;
        if let Some(slot) = self
            .attribute_slots()
            .into_iter()
            .find(|s| *s >= limits.max_vertex_slots)
        {
            return Err(ConfigError::Invalid(format!(
                "vertex attribute slot {slot} exceeds the device limit of {}",
                limits.max_vertex_slots
            )));
        }
        if let Some(binding) = self
            .storage_bindings()
            .into_iter()
            .find(|b| *b >= limits.max_storage_bindings)
        {
            return Err(ConfigError::Invalid(format!(
                "storage binding {binding} exceeds the device limit of {}",
                limits.max_storage_bindings
            )));
        }
        Ok(())
    }
}

fn first_duplicate(values: &[u32]) -> Option<u32> {
    let mut seen = HashSet::new();
    values.iter().copied().find(|v| !seen.insert(*v))
}

/// Program names for the passes the pipeline draws itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassShaders {
    /// Compute program for the chunk cull dispatch.
    pub chunk_cull: String,
    /// Terrain program for color passes.
    pub terrain: String,
    /// Depth-only program bound for each shadow cascade, with the cascade's
    /// light transform set on it.
    pub shadow_depth: String,
    /// Full-screen deferred lighting composite.
    pub deferred: String,
    /// Sky program used to refresh the environment cube.
    pub sky: String,
}

impl Default for PassShaders {
    fn default() -> Self {
        Self {
            chunk_cull: "chunk_cull".into(),
            terrain: "terrain".into(),
            shadow_depth: "shadow_depth".into(),
            deferred: "deferred".into(),
            sky: "sky".into(),
        }
    }
}

/// What one post filter does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterKind {
    /// One program over one input.
    Single {
        /// Program name.
        shader: String,
    },
    /// Two programs back to back through an intermediate target.
    Dual {
        /// First program.
        first: String,
        /// Second program.
        second: String,
    },
    /// One program over several inputs.
    Combine {
        /// Program name.
        shader: String,
    },
}

/// One stage of the post-filter chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// The name later stages use to read this stage's output.
    pub name: String,
    /// The stage's operation.
    pub kind: FilterKind,
    /// Names of the targets read, bound to texture units in order.
    pub inputs: Vec<String>,
    /// Format of the stage's output.
    pub format: TextureFormat,
}

/// Everything the frame pipeline fixes at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// LOD distance bands.
    pub lod: LodConfig,
    /// Tiers in drawing order.
    pub tiers: Vec<TierConfig>,
    /// Slot and binding assignments.
    pub slots: SlotLayout,
    /// Programs for pipeline-owned passes.
    pub shaders: PassShaders,
    /// Edge length of each shadow cascade map.
    pub shadow_map_size: u32,
    /// Reflection target size relative to the viewport, in `(0, 1]`.
    pub reflection_scale: f32,
    /// Frames to wait after a terrain is added before drawing it.
    pub terrain_draw_delay: u32,
    /// Edge length of the environment cube faces.
    pub sky_cube_size: u32,
    /// The post-filter chain, in execution order.
    pub filters: Vec<FilterConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lod: LodConfig::default(),
            tiers: vec![
                TierConfig::new(TierKind::DynamicNear, 1),
                TierConfig::new(TierKind::StaticNear, 1),
                TierConfig::new(TierKind::StaticMid, 2),
                TierConfig::new(TierKind::StaticFar, 3),
                TierConfig::new(TierKind::AnimatedNear, 1),
                TierConfig::new(TierKind::AnimatedMid, 2),
                TierConfig::new(TierKind::AnimatedFar, 3),
                TierConfig::new(TierKind::Unshadowed, 0),
            ],
            slots: SlotLayout::default(),
            shaders: PassShaders::default(),
            shadow_map_size: 2048,
            reflection_scale: 0.5,
            terrain_draw_delay: 2,
            sky_cube_size: 256,
            filters: vec![
                FilterConfig {
                    name: "bloom_extract".into(),
                    kind: FilterKind::Single {
                        shader: "bloom_extract".into(),
                    },
                    inputs: vec!["deferred".into()],
                    format: TextureFormat::Rgba16Float,
                },
                FilterConfig {
                    name: "bloom_blur".into(),
                    kind: FilterKind::Dual {
                        first: "blur_h".into(),
                        second: "blur_v".into(),
                    },
                    inputs: vec!["bloom_extract".into()],
                    format: TextureFormat::Rgba16Float,
                },
                FilterConfig {
                    name: "combine".into(),
                    kind: FilterKind::Combine {
                        shader: "combine".into(),
                    },
                    inputs: vec!["deferred".into(), "bloom_blur".into()],
                    format: TextureFormat::Rgba8Unorm,
                },
            ],
        }
    }
}

impl PipelineConfig {
    /// Parses and validates a config from RON text.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron_str(&text)
    }

    /// Serializes the config as pretty-printed RON.
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// The shadow level of each tier, in tier order.
    pub fn shadow_levels(&self) -> Vec<u8> {
        self.tiers.iter().map(|t| t.shadow_level).collect()
    }

    /// Checks every construction-time rule that does not depend on the device.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tiers.is_empty() {
            return Err(ConfigError::Invalid("at least one tier is required".into()));
        }
        let mut kinds = HashSet::new();
        for tier in &self.tiers {
            if tier.shadow_level > 3 {
                return Err(ConfigError::Invalid(format!(
                    "tier {:?} has shadow level {}, expected 0..=3",
                    tier.kind, tier.shadow_level
                )));
            }
            if !kinds.insert(tier.kind) {
                return Err(ConfigError::Invalid(format!(
                    "tier {:?} is declared twice",
                    tier.kind
                )));
            }
        }

        let lod = &self.lod;
        if !(lod.mid_distance > 0.0 && lod.mid_distance < lod.low_distance) {
            return Err(ConfigError::Invalid(format!(
                "LOD bands must satisfy 0 < mid_distance < low_distance (got {} and {})",
                lod.mid_distance, lod.low_distance
            )));
        }
        if lod.velocity_scale < 0.0 || lod.max_velocity_boost < 0.0 {
            return Err(ConfigError::Invalid(
                "velocity scale and boost must not be negative".into(),
            ));
        }

        self.slots.validate()?;

        if self.shadow_map_size == 0 || self.sky_cube_size == 0 {
            return Err(ConfigError::Invalid(
                "shadow map and sky cube sizes must be non-zero".into(),
            ));
        }
        if !(self.reflection_scale > 0.0 && self.reflection_scale <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "reflection scale {} is outside (0, 1]",
                self.reflection_scale
            )));
        }

        let mut names = HashSet::new();
        for filter in &self.filters {
            if BUILTIN_TARGETS.contains(&filter.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "filter name '{}' shadows a built-in target",
                    filter.name
                )));
            }
            if !names.insert(filter.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "filter '{}' is declared twice",
                    filter.name
                )));
            }
            if filter.inputs.iter().any(|input| *input == filter.name) {
                return Err(ConfigError::Invalid(format!(
                    "filter '{}' reads its own output",
                    filter.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.shadow_levels(), vec![1, 1, 2, 3, 1, 2, 3, 0]);
        config
            .slots
            .validate_against(&DeviceLimits::default())
            .unwrap();
    }

    #[test]
    fn test_partial_ron_fills_defaults() {
        let text = r#"(
            lod: (mid_distance: 10.0, low_distance: 50.0),
            terrain_draw_delay: 0,
        )"#;
        let config = PipelineConfig::from_ron_str(text).unwrap();
        assert_eq!(config.lod.mid_distance, 10.0);
        assert_eq!(config.lod.velocity_scale, LodConfig::default().velocity_scale);
        assert_eq!(config.terrain_draw_delay, 0);
        assert_eq!(config.tiers.len(), 8);
    }

    #[test]
    fn test_ron_text_survives_reload() {
        let config = PipelineConfig::default();
        let text = config.to_ron_string().unwrap();
        assert_eq!(PipelineConfig::from_ron_str(&text).unwrap(), config);
    }

    #[test]
    fn test_rejects_bad_configs() {
        let mut config = PipelineConfig::default();
        config.tiers[2].shadow_level = 4;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = PipelineConfig::default();
        config.lod.low_distance = config.lod.mid_distance;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.slots.tangent = config.slots.position;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.filters[0].inputs = vec!["bloom_extract".into()];
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.tiers.push(TierConfig::new(TierKind::StaticNear, 1));
        assert!(config.validate().is_err());

        assert!(matches!(
            PipelineConfig::from_ron_str("(tiers: 3)"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_slot_limits() {
        let limits = DeviceLimits {
            max_storage_bindings: 4,
            ..DeviceLimits::default()
        };
        let err = SlotLayout::default().validate_against(&limits).unwrap_err();
        assert!(err.to_string().contains("storage binding 4"));
    }
}
