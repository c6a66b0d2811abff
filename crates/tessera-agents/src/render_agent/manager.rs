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

//! Defines the RenderManager, which owns the frame pipeline's resources and
//! records each frame's passes.

use super::{FrameStage, FrameStats, StageTracker};
use std::sync::Arc;
use tessera_core::config::PipelineConfig;
use tessera_core::renderer::{
    CommandEncoder, FilterMode, GraphicsDevice, ParamValue, RenderError, ShaderId,
    ShaderLibrary, TextureFormat, TextureId,
};
use tessera_core::scene::{PassKind, SceneSource};
use tessera_lanes::render_lane::{
    CullView, FilterChain, FrameQueueSet, IndirectCullPass, RenderTarget, TargetError,
    TerrainMesh, TierPolicy,
};

/// Number of shadow cascades, levels 1 to 3.
pub const SHADOW_LEVELS: u8 = 3;

const CUBE_FACES: u32 = 6;
const LIGHT_VIEW_PROJ: &str = "lightViewProj";

/// Programs the pipeline draws with itself, resolved once.
#[derive(Debug, Clone, Copy)]
struct Programs {
    chunk_cull: ShaderId,
    terrain: ShaderId,
    shadow_depth: ShaderId,
    deferred: ShaderId,
    sky: ShaderId,
}

/// Targets whose size follows the viewport.
#[derive(Debug)]
struct ViewTargets {
    scene: RenderTarget,
    water: RenderTarget,
    reflect: RenderTarget,
    deferred: RenderTarget,
    filters: FilterChain,
}

/// The frame pipeline.
///
/// Each frame runs [`update_queues`](Self::update_queues), then
/// [`swap_queues`](Self::swap_queues), then [`render_frame`](Self::render_frame),
/// or all three through [`frame`](Self::frame). Calling them out of order is
/// a [`RenderError::StageOrder`].
pub struct RenderManager {
    device: Arc<dyn GraphicsDevice>,
    shaders: Arc<dyn ShaderLibrary>,
    config: PipelineConfig,
    programs: Programs,
    width: u32,
    height: u32,
    // Swapped every frame; feeds the color passes.
    main: FrameQueueSet,
    // Swapped on request; feeds the shadow passes.
    secondary: FrameQueueSet,
    secondary_pending: bool,
    policy: TierPolicy,
    view: ViewTargets,
    shadows: Vec<RenderTarget>,
    sky: RenderTarget,
    terrains: Vec<IndirectCullPass>,
    tracker: StageTracker,
    wireframe: bool,
    frame_count: u64,
    last_stats: FrameStats,
}

impl RenderManager {
    /// Validates `config` against the device and allocates every target.
    ///
    /// Any construction-contract failure is returned and nothing is kept.
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        shaders: Arc<dyn ShaderLibrary>,
        config: PipelineConfig,
        width: u32,
        height: u32,
    ) -> Result<Self, RenderError> {
        config.validate()?;
        config.slots.validate_against(&device.limits())?;
        check_size(width, height)?;

        let resolve = |name: &str| {
            shaders.shader(name).ok_or_else(|| {
                log::error!("RenderManager: Program '{name}' is not in the shader library");
                RenderError::MissingShader(name.to_owned())
            })
        };
        let programs = Programs {
            chunk_cull: resolve(&config.shaders.chunk_cull)?,
            terrain: resolve(&config.shaders.terrain)?,
            shadow_depth: resolve(&config.shaders.shadow_depth)?,
            deferred: resolve(&config.shaders.deferred)?,
            sky: resolve(&config.shaders.sky)?,
        };

        let view = Self::create_view_targets(&device, &*shaders, &config, width, height)?;
        let shadows = (1..=SHADOW_LEVELS)
            .map(|level| {
                RenderTarget::depth_only_builder(
                    &format!("shadow{level}"),
                    config.shadow_map_size,
                    config.shadow_map_size,
                    TextureFormat::Depth32Float,
                )?
                .build(device.clone())
            })
            .collect::<Result<Vec<_>, TargetError>>()?;
        let sky = RenderTarget::cube_builder("sky", config.sky_cube_size)
            .color(0, TextureFormat::Rgba16Float, FilterMode::Linear)?
            .build(device.clone())?;

        log::info!(
            "RenderManager: Created {}x{} pipeline with {} tiers and {} filters",
            width,
            height,
            config.tiers.len(),
            config.filters.len()
        );
        Ok(Self {
            main: FrameQueueSet::new("main", &config.tiers),
            secondary: FrameQueueSet::new("secondary", &config.tiers),
            secondary_pending: true,
            policy: TierPolicy::new(config.lod, &config.tiers),
            device,
            shaders,
            config,
            programs,
            width,
            height,
            view,
            shadows,
            sky,
            terrains: Vec::new(),
            tracker: StageTracker::default(),
            wireframe: false,
            frame_count: 0,
            last_stats: FrameStats::default(),
        })
    }

    fn create_view_targets(
        device: &Arc<dyn GraphicsDevice>,
        shaders: &dyn ShaderLibrary,
        config: &PipelineConfig,
        width: u32,
        height: u32,
    ) -> Result<ViewTargets, RenderError> {
        let scene = RenderTarget::builder("scene", width, height)
            .color(0, TextureFormat::Rgba16Float, FilterMode::Linear)?
            .color(1, TextureFormat::Rgba16Float, FilterMode::Nearest)?
            .depth(TextureFormat::Depth32Float)?
            .build(device.clone())?;
        let water = RenderTarget::builder("water", width, height)
            .color(0, TextureFormat::Rgba8Unorm, FilterMode::Linear)?
            .depth(TextureFormat::Depth32Float)?
            .build(device.clone())?;
        let scaled = |v: u32| ((v as f32 * config.reflection_scale) as u32).max(1);
        let reflect = RenderTarget::builder("reflect", scaled(width), scaled(height))
            .color(0, TextureFormat::Rgba8Unorm, FilterMode::Linear)?
            .depth(TextureFormat::Depth32Float)?
            .build(device.clone())?;
        let deferred = RenderTarget::builder("deferred", width, height)
            .color(0, TextureFormat::Rgba16Float, FilterMode::Linear)?
            .build(device.clone())?;
        let filters = FilterChain::new(device.clone(), &config.filters, shaders, width, height)?;
        Ok(ViewTargets {
            scene,
            water,
            reflect,
            deferred,
            filters,
        })
    }

    /// Adds a culled terrain drawcall. Returns its index.
    pub fn add_terrain(&mut self, mesh: &TerrainMesh) -> Result<usize, RenderError> {
        let pass = IndirectCullPass::new(
            self.device.clone(),
            mesh,
            self.programs.chunk_cull,
            &self.config.slots,
            self.config.terrain_draw_delay,
        )?;
        self.terrains.push(pass);
        Ok(self.terrains.len() - 1)
    }

    /// Sorts this frame's visible drawables into the `next` queues.
    pub fn update_queues(&mut self, scene: &dyn SceneSource) -> Result<(), RenderError> {
        self.tracker.advance(FrameStage::UpdateQueues)?;
        let speed = scene.camera().speed;
        let refresh_secondary = self.secondary_pending;
        let policy = &self.policy;
        let main = self.main.next_mut();
        let secondary = self.secondary.next_mut();
        let mut result = Ok(());
        scene.visit_visible(&mut |drawable| {
            if result.is_err() {
                return;
            }
            let Some(tier) = policy.tier_for(&drawable, speed) else {
                log::trace!(
                    "RenderManager: No tier for {:?}, not queued",
                    drawable.handle
                );
                return;
            };
            result = main.push(tier, drawable.handle).and_then(|()| {
                if refresh_secondary && drawable.casts_shadow {
                    secondary.push(tier, drawable.handle)
                } else {
                    Ok(())
                }
            });
        });
        if let Err(err) = result {
            self.tracker.reset();
            return Err(RenderError::Internal(err.to_string()));
        }
        self.secondary_pending = false;
        Ok(())
    }

    /// Promotes the queues filled by [`update_queues`](Self::update_queues).
    /// The secondary set only swaps when `swap_secondary` is set.
    pub fn swap_queues(&mut self, swap_secondary: bool) -> Result<(), RenderError> {
        self.tracker.advance(FrameStage::SwapQueues)?;
        self.main.swap();
        if swap_secondary {
            self.secondary.swap();
            self.secondary_pending = true;
        }
        Ok(())
    }

    /// Runs a whole frame.
    pub fn frame(
        &mut self,
        scene: &dyn SceneSource,
        swap_secondary: bool,
    ) -> Result<FrameStats, RenderError> {
        self.update_queues(scene)?;
        self.swap_queues(swap_secondary)?;
        self.render_frame(scene)
    }

    /// Records and submits every pass from the shadow pass to presentation.
    /// On failure the frame is dropped and the pipeline returns to `Idle`.
    pub fn render_frame(&mut self, scene: &dyn SceneSource) -> Result<FrameStats, RenderError> {
        self.tracker.advance(FrameStage::ShadowPass)?;
        self.frame_count += 1;
        let mut stats = FrameStats::begin(self.frame_count);
        let result = self.record_frame(scene, &mut stats);
        self.tracker.reset();
        result?;

        log::debug!(
            "RenderManager: Frame {} draws={} indirect={} dispatches={} groups={} filters={} skipped={:?}",
            stats.frame,
            stats.draws,
            stats.indirect_draws,
            stats.dispatches,
            stats.cull_groups,
            stats.filter_passes,
            stats.stages_skipped
        );
        self.last_stats = stats.clone();
        Ok(stats)
    }

    fn record_frame(
        &mut self,
        scene: &dyn SceneSource,
        stats: &mut FrameStats,
    ) -> Result<(), RenderError> {
        let mut recording = self.device.create_command_encoder(Some("frame"));
        let encoder = recording.as_mut();

        stats.stages_run.push(FrameStage::ShadowPass);
        self.shadow_pass(scene, encoder, stats)?;

        self.enter(FrameStage::OpaqueScenePass, stats)?;
        self.opaque_pass(scene, encoder, stats)?;

        let water = scene.water_visible();
        let sky_changed = scene.sky_changed();
        if water {
            self.enter(FrameStage::WaterPass, stats)?;
            self.water_pass(scene, encoder, stats)?;
        } else {
            self.skip(FrameStage::WaterPass, stats);
        }
        if water || sky_changed {
            self.enter(FrameStage::ReflectionPass, stats)?;
            self.reflection_pass(scene, encoder, stats, water, sky_changed)?;
        } else {
            self.skip(FrameStage::ReflectionPass, stats);
        }

        self.enter(FrameStage::DeferredComposite, stats)?;
        self.deferred_composite(encoder, water);

        self.enter(FrameStage::PostFilterChain, stats)?;
        let view = &self.view;
        let sources = |name: &str| match name {
            "scene.color0" => view.scene.color(0),
            "scene.depth" => view.scene.depth(),
            "deferred" => view.deferred.color(0),
            "water" => view.water.color(0),
            "reflect" => view.reflect.color(0),
            _ => None,
        };
        stats.filter_passes = view.filters.run(encoder, &sources)? as u32;

        self.enter(FrameStage::Present, stats)?;
        stats.presented = self
            .view
            .filters
            .final_output()
            .or_else(|| self.view.deferred.color(0));
        self.device.submit_command_buffer(recording.finish())?;
        Ok(())
    }

    fn enter(&mut self, stage: FrameStage, stats: &mut FrameStats) -> Result<(), RenderError> {
        self.tracker.advance(stage)?;
        stats.stages_run.push(stage);
        Ok(())
    }

    fn skip(&self, stage: FrameStage, stats: &mut FrameStats) {
        log::debug!("RenderManager: {} skipped", stage.name());
        stats.stages_skipped.push(stage);
    }

    fn shadow_pass(
        &self,
        scene: &dyn SceneSource,
        encoder: &mut dyn CommandEncoder,
        stats: &mut FrameStats,
    ) -> Result<(), RenderError> {
        let queue = self.secondary.current();
        for (target, level) in self.shadows.iter().zip(1..=SHADOW_LEVELS) {
            target.begin_use(encoder);
            encoder.set_shader(self.programs.shadow_depth);
            encoder.set_param(
                LIGHT_VIEW_PROJ,
                ParamValue::Mat4(scene.light_view_proj(level)),
            );
            for handle in queue.shadow_casters(level) {
                scene.encode_drawable(handle, PassKind::Shadow { level }, encoder)?;
                stats.draws += 1;
            }
        }
        Ok(())
    }

    fn draw_terrains(
        &mut self,
        encoder: &mut dyn CommandEncoder,
        view: CullView,
        shader: ShaderId,
        stats: &mut FrameStats,
    ) -> Result<(), RenderError> {
        for terrain in &mut self.terrains {
            let groups = terrain.update(encoder, &view)?;
            if groups > 0 {
                stats.dispatches += 1;
                stats.cull_groups += groups;
            }
            if terrain.draw(encoder, shader, self.wireframe)? {
                stats.indirect_draws += 1;
            }
        }
        Ok(())
    }

    fn draw_queue(
        &self,
        scene: &dyn SceneSource,
        encoder: &mut dyn CommandEncoder,
        pass: PassKind,
        stats: &mut FrameStats,
    ) -> Result<(), RenderError> {
        for tier in self.main.current().draw_order() {
            for handle in tier.members() {
                scene.encode_drawable(*handle, pass, encoder)?;
                stats.draws += 1;
            }
        }
        Ok(())
    }

    fn opaque_pass(
        &mut self,
        scene: &dyn SceneSource,
        encoder: &mut dyn CommandEncoder,
        stats: &mut FrameStats,
    ) -> Result<(), RenderError> {
        let camera = scene.camera();
        self.view.scene.begin_use(encoder);
        let terrain = self.programs.terrain;
        let view = CullView::new(camera.view_proj, camera.position);
        self.draw_terrains(encoder, view, terrain, stats)?;
        self.draw_queue(scene, encoder, PassKind::Opaque, stats)
    }

    fn water_pass(
        &self,
        scene: &dyn SceneSource,
        encoder: &mut dyn CommandEncoder,
        stats: &mut FrameStats,
    ) -> Result<(), RenderError> {
        self.view.water.begin_use(encoder);
        self.draw_queue(scene, encoder, PassKind::Water, stats)
    }

    fn reflection_pass(
        &mut self,
        scene: &dyn SceneSource,
        encoder: &mut dyn CommandEncoder,
        stats: &mut FrameStats,
        water: bool,
        sky_changed: bool,
    ) -> Result<(), RenderError> {
        if sky_changed {
            for face in 0..CUBE_FACES {
                self.sky.begin_use_face(encoder, face, 0)?;
                encoder.set_shader(self.programs.sky);
                encoder.draw_fullscreen();
                stats.sky_faces += 1;
            }
        }
        if water {
            let camera = scene.camera();
            self.view.reflect.begin_use(encoder);
            let terrain = self.programs.terrain;
            let view = CullView::new(scene.reflection_view_proj(), camera.position);
            self.draw_terrains(encoder, view, terrain, stats)?;
            self.draw_queue(scene, encoder, PassKind::Reflection, stats)?;
        }
        Ok(())
    }

    fn deferred_composite(&self, encoder: &mut dyn CommandEncoder, water: bool) {
        let mut inputs: Vec<TextureId> = Vec::new();
        inputs.extend(self.view.scene.color(0));
        inputs.extend(self.view.scene.color(1));
        inputs.extend(self.view.scene.depth());
        inputs.extend(self.shadows.iter().filter_map(RenderTarget::depth));
        if water {
            inputs.extend(self.view.water.color(0));
            inputs.extend(self.view.reflect.color(0));
        }

        self.view.deferred.begin_use(encoder);
        encoder.set_shader(self.programs.deferred);
        for (unit, texture) in inputs.iter().enumerate() {
            encoder.bind_texture(unit as u32, *texture);
        }
        encoder.draw_fullscreen();
        for unit in 0..inputs.len() {
            encoder.unbind_texture(unit as u32);
        }
    }

    /// Rebuilds the viewport-sized targets for a new size. Calling it with
    /// the current size changes nothing. Shadow and sky targets keep their
    /// configured sizes.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if self.tracker.current() != FrameStage::Idle {
            return Err(RenderError::StageOrder {
                attempted: "resize",
                current: self.tracker.current().name(),
            });
        }
        check_size(width, height)?;
        if (width, height) == (self.width, self.height) {
            return Ok(());
        }
        self.view = Self::create_view_targets(
            &self.device,
            &*self.shaders,
            &self.config,
            width,
            height,
        )?;
        self.width = width;
        self.height = height;
        log::info!("RenderManager: Resized to {width}x{height}");
        Ok(())
    }

    /// Draws terrain in wireframe from the next frame on.
    pub fn set_debug_wireframe(&mut self, enabled: bool) {
        self.wireframe = enabled;
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn stage(&self) -> FrameStage {
        self.tracker.current()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn main_queues(&self) -> &FrameQueueSet {
        &self.main
    }

    pub fn secondary_queues(&self) -> &FrameQueueSet {
        &self.secondary
    }

    pub fn terrain(&self, index: usize) -> Option<&IndirectCullPass> {
        self.terrains.get(index)
    }

    pub fn terrain_count(&self) -> usize {
        self.terrains.len()
    }

    pub fn scene_target(&self) -> &RenderTarget {
        &self.view.scene
    }

    pub fn water_target(&self) -> &RenderTarget {
        &self.view.water
    }

    pub fn reflection_target(&self) -> &RenderTarget {
        &self.view.reflect
    }

    pub fn deferred_target(&self) -> &RenderTarget {
        &self.view.deferred
    }

    pub fn filters(&self) -> &FilterChain {
        &self.view.filters
    }

    /// The depth-only target for shadow cascade `level`, 1 to 3.
    pub fn shadow_target(&self, level: u8) -> Option<&RenderTarget> {
        level
            .checked_sub(1)
            .and_then(|i| self.shadows.get(i as usize))
    }

    pub fn sky_target(&self) -> &RenderTarget {
        &self.sky
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn last_frame_stats(&self) -> &FrameStats {
        &self.last_stats
    }
}

impl std::fmt::Debug for RenderManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderManager")
            .field("size", &(self.width, self.height))
            .field("stage", &self.tracker.current())
            .field("terrains", &self.terrains.len())
            .field("frame_count", &self.frame_count)
            .finish_non_exhaustive()
    }
}

fn check_size(width: u32, height: u32) -> Result<(), RenderError> {
    if width == 0 || height == 0 {
        log::error!("RenderManager: Viewport {width}x{height} has a zero dimension");
        return Err(RenderError::ContractViolation(format!(
            "viewport {width}x{height} has a zero dimension"
        )));
    }
    Ok(())
}
