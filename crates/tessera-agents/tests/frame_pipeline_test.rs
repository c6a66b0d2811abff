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

//! Integration tests for the RenderManager frame pipeline, run on the
//! headless device.

use std::cell::RefCell;
use std::sync::Arc;
use tessera_agents::render_agent::{FrameStage, RenderManager};
use tessera_core::config::PipelineConfig;
use tessera_core::math::{Mat4, Vec3};
use tessera_core::renderer::{
    CommandEncoder, FillMode, GraphicsDevice, IndirectDrawRecord, RenderError, ShaderLibrary,
    TextureId,
};
use tessera_core::scene::{
    CameraView, DrawableClass, DrawableHandle, PassKind, SceneSource, VisibleDrawable,
};
use tessera_infra::graphics::headless::{Command, DrawKind, HeadlessDevice};
use tessera_lanes::render_lane::{ChunkCullKernel, TerrainMesh};

const PROGRAMS: [&str; 8] = [
    "terrain",
    "shadow_depth",
    "deferred",
    "sky",
    "bloom_extract",
    "blur_h",
    "blur_v",
    "combine",
];

#[derive(Default)]
struct TestScene {
    drawables: Vec<VisibleDrawable>,
    water: bool,
    sky_changed: bool,
    encoded: RefCell<Vec<(DrawableHandle, PassKind)>>,
}

impl TestScene {
    fn with_statics(handles: &[u64]) -> Self {
        Self {
            drawables: handles.iter().map(|h| static_near(*h)).collect(),
            ..Self::default()
        }
    }

    fn take_encoded(&self) -> Vec<(DrawableHandle, PassKind)> {
        self.encoded.take()
    }
}

impl SceneSource for TestScene {
    fn camera(&self) -> CameraView {
        let proj = Mat4::perspective_rh(60f32.to_radians(), 4.0 / 3.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        CameraView {
            view_proj: proj * view,
            position: Vec3::ZERO,
            speed: 0.0,
        }
    }

    fn light_view_proj(&self, _level: u8) -> Mat4 {
        Mat4::IDENTITY
    }

    fn visit_visible(&self, visitor: &mut dyn FnMut(VisibleDrawable)) {
        for drawable in &self.drawables {
            visitor(*drawable);
        }
    }

    fn water_visible(&self) -> bool {
        self.water
    }

    fn sky_changed(&self) -> bool {
        self.sky_changed
    }

    fn encode_drawable(
        &self,
        handle: DrawableHandle,
        pass: PassKind,
        _encoder: &mut dyn CommandEncoder,
    ) -> Result<(), RenderError> {
        self.encoded.borrow_mut().push((handle, pass));
        Ok(())
    }
}

fn static_near(handle: u64) -> VisibleDrawable {
    VisibleDrawable {
        handle: DrawableHandle(handle),
        class: DrawableClass::Static,
        distance: 5.0,
        casts_shadow: true,
    }
}

fn device_for(config: &PipelineConfig) -> Arc<HeadlessDevice> {
    let device = Arc::new(HeadlessDevice::new());
    device.register_kernel("chunk_cull", ChunkCullKernel::new(config.slots));
    for name in PROGRAMS {
        device.register_shader(name);
    }
    device
}

fn setup(config: PipelineConfig) -> (Arc<HeadlessDevice>, RenderManager) {
    let device = device_for(&config);
    let manager = RenderManager::new(device.clone(), device.clone(), config, 320, 240).unwrap();
    (device, manager)
}

fn no_delay() -> PipelineConfig {
    PipelineConfig {
        terrain_draw_delay: 0,
        ..PipelineConfig::default()
    }
}

/// Four chunks of four vertices each around `centers`, with the given index counts.
fn clustered_mesh(centers: &[Vec3], sizes: &[u32]) -> TerrainMesh {
    let mut positions = Vec::new();
    let mut indices = Vec::new();
    for (chunk, (center, size)) in centers.iter().zip(sizes).enumerate() {
        let base = positions.len() as u32;
        for offset in [
            Vec3::new(-1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, -1.0),
            Vec3::new(-1.0, 0.0, 1.0),
            Vec3::new(1.0, 0.5, 1.0),
        ] {
            positions.push(*center + offset);
        }
        indices.extend((0..*size).map(|i| base + (i * 7 + chunk as u32) % 4));
    }
    TerrainMesh::new(positions, indices).chunked_by(sizes.to_vec())
}

fn indirect_draws(device: &HeadlessDevice) -> Vec<(u32, Vec<u32>)> {
    device
        .draws()
        .into_iter()
        .filter_map(|d| match d.kind {
            DrawKind::Indirect {
                element_count,
                indices,
            } => Some((element_count, indices)),
            _ => None,
        })
        .collect()
}

#[test]
fn test_culled_terrain_draws_exactly_the_surviving_ranges() {
    let (device, mut manager) = setup(no_delay());
    let mesh = clustered_mesh(
        &[
            Vec3::new(0.0, 0.0, -10.0),
            Vec3::new(0.0, 0.0, 10.0),
            Vec3::new(2.0, 0.0, -20.0),
            Vec3::new(500.0, 0.0, -20.0),
        ],
        &[300, 150, 450, 600],
    );
    let terrain = manager.add_terrain(&mesh).unwrap();

    let stats = manager.frame(&TestScene::default(), true).unwrap();
    assert_eq!(stats.dispatches, 1);
    assert_eq!(stats.cull_groups, 4);
    assert_eq!(stats.indirect_draws, 1);

    let pass = manager.terrain(terrain).unwrap();
    let record: IndirectDrawRecord = bytemuck::pod_read_unaligned(
        &device
            .read_buffer(pass.indirect_buffer().unwrap(), 0, IndirectDrawRecord::SIZE)
            .unwrap(),
    );
    assert_eq!(record.element_count, 750);

    let mut expected = mesh.indices()[..300].to_vec();
    expected.extend_from_slice(&mesh.indices()[450..900]);
    let output = device
        .read_buffer(pass.output_buffer().unwrap(), 0, 750 * 4)
        .unwrap();
    assert_eq!(bytemuck::cast_slice::<u8, u32>(&output), expected.as_slice());
    assert_eq!(indirect_draws(&device), vec![(750, expected)]);
}

#[test]
fn test_tier_shadow_levels_survive_swap_and_flush() {
    let mut config = no_delay();
    config.tiers.truncate(7);
    let (_, mut manager) = setup(config);
    let levels = vec![1, 1, 2, 3, 1, 2, 3];

    for frame in 0..6u64 {
        let scene = TestScene::with_statics(&[frame * 10, frame * 10 + 1]);
        manager.frame(&scene, frame % 2 == 0).unwrap();

        for set in [manager.main_queues(), manager.secondary_queues()] {
            assert_eq!(set.current().shadow_levels(), levels);
            assert_eq!(set.next().shadow_levels(), levels);
            assert_eq!(set.current().tier_count(), 7);
        }
        // Only this frame's drawables, nothing carried over.
        let current: Vec<_> = manager
            .main_queues()
            .current()
            .tiers()
            .iter()
            .flat_map(|t| t.members().to_vec())
            .collect();
        assert_eq!(
            current,
            vec![DrawableHandle(frame * 10), DrawableHandle(frame * 10 + 1)]
        );
        assert_eq!(manager.main_queues().next().member_count(), 0);
    }
}

#[test]
fn test_stage_order_is_enforced() {
    let (_, mut manager) = setup(no_delay());
    let scene = TestScene::with_statics(&[1]);

    assert!(matches!(
        manager.render_frame(&scene),
        Err(RenderError::StageOrder {
            attempted: "ShadowPass",
            current: "Idle"
        })
    ));
    assert!(manager.swap_queues(false).is_err());

    manager.update_queues(&scene).unwrap();
    assert!(manager.update_queues(&scene).is_err());
    assert!(manager.resize(64, 64).is_err());
    assert!(manager.render_frame(&scene).is_err());
    assert_eq!(manager.stage(), FrameStage::UpdateQueues);

    manager.swap_queues(true).unwrap();
    let stats = manager.render_frame(&scene).unwrap();
    assert_eq!(manager.stage(), FrameStage::Idle);
    assert_eq!(stats.frame, 1);
    assert_eq!(manager.last_frame_stats(), &stats);
}

#[test]
fn test_optional_stages_follow_scene_flags() {
    let (device, mut manager) = setup(no_delay());
    let mut scene = TestScene::with_statics(&[1]);

    let stats = manager.frame(&scene, true).unwrap();
    assert_eq!(
        stats.stages_run,
        vec![
            FrameStage::ShadowPass,
            FrameStage::OpaqueScenePass,
            FrameStage::DeferredComposite,
            FrameStage::PostFilterChain,
            FrameStage::Present,
        ]
    );
    assert_eq!(
        stats.stages_skipped,
        vec![FrameStage::WaterPass, FrameStage::ReflectionPass]
    );
    assert_eq!(stats.filter_passes, 4);
    assert_eq!(stats.presented, manager.filters().final_output());
    assert_eq!(
        scene.take_encoded(),
        vec![
            (DrawableHandle(1), PassKind::Shadow { level: 1 }),
            (DrawableHandle(1), PassKind::Opaque),
        ]
    );

    scene.water = true;
    scene.sky_changed = true;
    device.clear_logs();
    let stats = manager.frame(&scene, false).unwrap();
    assert!(stats.ran(FrameStage::WaterPass));
    assert!(stats.ran(FrameStage::ReflectionPass));
    assert!(stats.stages_skipped.is_empty());
    assert_eq!(stats.sky_faces, 6);
    let passes: Vec<PassKind> = scene.take_encoded().into_iter().map(|(_, p)| p).collect();
    assert_eq!(
        passes,
        vec![
            PassKind::Shadow { level: 1 },
            PassKind::Opaque,
            PassKind::Water,
            PassKind::Reflection,
        ]
    );

    // The composite samples the water and reflection targets when water is drawn.
    let deferred = device.shader("deferred").unwrap();
    let composite = device
        .draws()
        .into_iter()
        .find(|d| d.shader == Some(deferred))
        .unwrap();
    match composite.kind {
        DrawKind::Fullscreen { inputs } => {
            assert_eq!(inputs.len(), 8);
            assert!(inputs.contains(&manager.water_target().color(0).unwrap()));
            assert!(inputs.contains(&manager.reflection_target().color(0).unwrap()));
        }
        other => panic!("unexpected composite draw {other:?}"),
    }
}

#[test]
fn test_secondary_queues_keep_their_own_cadence() {
    let (_, mut manager) = setup(no_delay());
    let shadow_handles = |scene: &TestScene| -> Vec<u64> {
        scene
            .take_encoded()
            .into_iter()
            .filter(|(_, pass)| matches!(pass, PassKind::Shadow { .. }))
            .map(|(h, _)| h.0)
            .collect()
    };

    let first = TestScene::with_statics(&[1]);
    manager.frame(&first, true).unwrap();
    assert_eq!(shadow_handles(&first), vec![1]);

    let second = TestScene::with_statics(&[2]);
    manager.frame(&second, false).unwrap();
    assert_eq!(shadow_handles(&second), vec![1]);
    assert_eq!(manager.main_queues().current().tier(1).unwrap().members(), &[DrawableHandle(2)]);

    let third = TestScene::with_statics(&[3]);
    manager.frame(&third, true).unwrap();
    assert_eq!(shadow_handles(&third), vec![2]);
    assert_eq!(manager.main_queues().swap_count(), 3);
    assert_eq!(manager.secondary_queues().swap_count(), 2);
}

#[test]
fn test_resize_is_idempotent() {
    let (device, mut manager) = setup(no_delay());
    let color = manager.scene_target().color(0);
    let textures = device.live_texture_count();

    manager.resize(320, 240).unwrap();
    assert_eq!(manager.scene_target().color(0), color);

    manager.resize(640, 480).unwrap();
    manager.resize(640, 480).unwrap();
    assert_eq!(manager.size(), (640, 480));
    assert_eq!(manager.scene_target().size(), (640, 480));
    assert_eq!(manager.deferred_target().size(), (640, 480));
    assert_eq!(manager.reflection_target().size(), (320, 240));
    assert_eq!(manager.shadow_target(1).unwrap().size(), (2048, 2048));
    assert_eq!(device.live_texture_count(), textures);

    assert!(matches!(
        manager.resize(0, 480),
        Err(RenderError::ContractViolation(_))
    ));
    assert_eq!(manager.size(), (640, 480));
}

#[test]
fn test_frame_after_resize_reads_only_new_targets() {
    let (device, mut manager) = setup(no_delay());
    manager.frame(&TestScene::with_statics(&[1]), true).unwrap();
    let old: Vec<TextureId> = [
        manager.scene_target().color(0),
        manager.scene_target().color(1),
        manager.scene_target().depth(),
        manager.deferred_target().color(0),
    ]
    .into_iter()
    .flatten()
    .collect();

    manager.resize(640, 480).unwrap();
    let before = device.draws().len();
    manager.frame(&TestScene::with_statics(&[1]), true).unwrap();
    let draws = device.draws().split_off(before);

    let fullscreen: Vec<_> = draws
        .iter()
        .filter_map(|d| match &d.kind {
            DrawKind::Fullscreen { inputs } => Some((d.viewport, inputs.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(fullscreen.len(), 1 + manager.filters().pass_count());
    for (viewport, inputs) in &fullscreen {
        assert_eq!((viewport.width, viewport.height), (640, 480));
        assert!(inputs.iter().all(|texture| !old.contains(texture)));
    }

    let deferred = device.shader("deferred").unwrap();
    let composite = draws.iter().find(|d| d.shader == Some(deferred)).unwrap();
    match &composite.kind {
        DrawKind::Fullscreen { inputs } => {
            assert!(inputs.contains(&manager.scene_target().color(0).unwrap()));
            assert!(inputs.contains(&manager.scene_target().depth().unwrap()));
        }
        other => panic!("unexpected composite draw {other:?}"),
    }
}

#[test]
fn test_color_passes_draw_near_tiers_first() {
    let (_device, mut manager) = setup(no_delay());
    let scene = TestScene {
        drawables: vec![
            VisibleDrawable {
                handle: DrawableHandle(1),
                class: DrawableClass::Static,
                distance: 500.0,
                casts_shadow: true,
            },
            VisibleDrawable {
                handle: DrawableHandle(2),
                class: DrawableClass::Animated,
                distance: 5.0,
                casts_shadow: true,
            },
            VisibleDrawable {
                handle: DrawableHandle(3),
                class: DrawableClass::Static,
                distance: 100.0,
                casts_shadow: true,
            },
            VisibleDrawable {
                handle: DrawableHandle(4),
                class: DrawableClass::Static,
                distance: 2.0,
                casts_shadow: false,
            },
        ],
        ..TestScene::default()
    };
    manager.frame(&scene, true).unwrap();

    let opaque: Vec<u64> = scene
        .take_encoded()
        .into_iter()
        .filter(|(_, pass)| *pass == PassKind::Opaque)
        .map(|(handle, _)| handle.0)
        .collect();
    assert_eq!(opaque, vec![2, 4, 3, 1]);
}

#[test]
fn test_shadow_cascades_bind_depth_program_and_light_transform() {
    let (device, mut manager) = setup(no_delay());
    let shadow = device.shader("shadow_depth").unwrap();
    device.clear_logs();
    manager.frame(&TestScene::with_statics(&[1]), true).unwrap();

    let log = device.command_log();
    let binds = log
        .iter()
        .filter(|c| matches!(c, Command::SetShader(id) if *id == shadow))
        .count();
    let lights = log
        .iter()
        .filter(|c| matches!(c, Command::SetParam { name, .. } if name == "lightViewProj"))
        .count();
    assert_eq!(binds, 3);
    assert_eq!(lights, 3);
}

#[test]
fn test_empty_terrain_dispatches_nothing() {
    let (device, mut manager) = setup(no_delay());
    manager
        .add_terrain(&TerrainMesh::new(vec![Vec3::ZERO], Vec::new()))
        .unwrap();
    let stats = manager.frame(&TestScene::default(), true).unwrap();
    assert_eq!(stats.dispatches, 0);
    assert_eq!(stats.indirect_draws, 0);
    assert_eq!(device.dispatched_groups(), 0);
}

#[test]
fn test_terrain_draw_waits_for_warmup() {
    let (device, mut manager) = setup(PipelineConfig::default());
    manager
        .add_terrain(&TerrainMesh::grid(2, 2, 4, 1.0, |_, _| -2.0))
        .unwrap();
    let scene = TestScene::default();

    let draws: Vec<u32> = (0..3)
        .map(|_| manager.frame(&scene, true).unwrap().indirect_draws)
        .collect();
    assert_eq!(draws, vec![0, 0, 1]);
    assert_eq!(indirect_draws(&device).len(), 1);

    manager.set_debug_wireframe(true);
    manager.frame(&scene, true).unwrap();
    let terrain = manager.config().shaders.terrain.clone();
    let terrain = device.shader(&terrain).unwrap();
    let last = device
        .draws()
        .into_iter()
        .rev()
        .find(|d| d.shader == Some(terrain))
        .unwrap();
    assert_eq!(last.fill_mode, FillMode::Line);
}

#[test]
fn test_construction_contracts() {
    let config = PipelineConfig::default();
    let device = Arc::new(HeadlessDevice::new());
    device.register_kernel("chunk_cull", ChunkCullKernel::new(config.slots));
    let err = RenderManager::new(device.clone(), device.clone(), config.clone(), 320, 240)
        .unwrap_err();
    assert!(matches!(err, RenderError::MissingShader(name) if name == "terrain"));

    let device = device_for(&config);
    let mut bad = config.clone();
    bad.tiers[0].shadow_level = 4;
    assert!(matches!(
        RenderManager::new(device.clone(), device.clone(), bad, 320, 240),
        Err(RenderError::Config(_))
    ));
    assert!(matches!(
        RenderManager::new(device.clone(), device.clone(), config, 0, 240),
        Err(RenderError::ContractViolation(_))
    ));
    assert_eq!(device.live_texture_count(), 0);
}
