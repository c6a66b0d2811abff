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

// Runs the frame pipeline over a chunked terrain on the headless device and
// logs what each frame recorded.
// Run with: cargo run -p sandbox -- --frames 8

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tessera_agents::render_agent::RenderManager;
use tessera_core::config::{FilterKind, PipelineConfig};
use tessera_core::math::{Mat4, Vec3};
use tessera_core::renderer::{
    CommandEncoder, ComponentType, IndexFormat, RenderError, ShaderId, VertexAttribute,
};
use tessera_core::scene::{
    CameraView, DrawableClass, DrawableHandle, PassKind, SceneSource, VisibleDrawable,
};
use tessera_infra::{HeadlessDevice, LoggingConfig, init_logging};
use tessera_lanes::render_lane::{BufferRole, ChunkCullKernel, DeviceBuffer, TerrainMesh};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

#[derive(Parser, Debug)]
#[command(about = "Drives the frame pipeline on the headless device")]
struct Args {
    /// Number of frames to render.
    #[arg(long, default_value_t = 8)]
    frames: u32,
    /// A RON pipeline config. The built-in defaults are used when absent.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Draw terrain in wireframe.
    #[arg(long)]
    wireframe: bool,
    /// Log filter, as in RUST_LOG.
    #[arg(long)]
    log: Option<String>,
}

/// A handful of cubes orbiting over the terrain.
struct DemoScene {
    cube: DeviceBuffer,
    program: ShaderId,
    camera: CameraView,
    drawables: Vec<VisibleDrawable>,
    water: bool,
    sky_changed: bool,
}

impl DemoScene {
    fn new(device: &Arc<HeadlessDevice>) -> Result<Self> {
        let corners: Vec<Vec3> = (0..8)
            .map(|i| {
                Vec3::new(
                    if i & 1 == 0 { -0.5 } else { 0.5 },
                    if i & 2 == 0 { -0.5 } else { 0.5 },
                    if i & 4 == 0 { -0.5 } else { 0.5 },
                )
            })
            .collect();
        let indices: [u32; 36] = [
            0, 2, 1, 1, 2, 3, 4, 5, 6, 5, 7, 6, 0, 1, 4, 1, 5, 4, 2, 6, 3, 3, 6, 7, 0, 4, 2, 2, 4,
            6, 1, 3, 5, 3, 7, 5,
        ];
        let mut cube = DeviceBuffer::new(device.clone(), "cube", 2);
        cube.set_attrib_data(
            0,
            VertexAttribute {
                slot: 0,
                component: ComponentType::Float32,
                components: 3,
                normalized: false,
                divisor: 0,
            },
            &corners,
        )?;
        cube.set_buffer_data(
            1,
            BufferRole::Index(IndexFormat::Uint32),
            (indices.len() * 4) as u64,
            bytemuck::cast_slice(&indices),
        )?;
        Ok(Self {
            cube,
            program: device.register_shader("mesh"),
            camera: CameraView::default(),
            drawables: Vec::new(),
            water: false,
            sky_changed: true,
        })
    }

    /// Moves the camera along its orbit and rebuilds the visible set.
    fn advance(&mut self, frame: u32) {
        let center = Vec3::new(64.0, 0.0, 64.0);
        let angle = frame as f32 * 0.35;
        let eye = center + Vec3::new(angle.cos() * 80.0, 40.0, angle.sin() * 80.0);
        let proj = Mat4::perspective_rh(
            60f32.to_radians(),
            WIDTH as f32 / HEIGHT as f32,
            0.1,
            500.0,
        );
        let speed = if frame == 0 {
            0.0
        } else {
            eye.distance(self.camera.position) * 60.0
        };
        self.camera = CameraView {
            view_proj: proj * Mat4::look_at_rh(eye, center, Vec3::Y),
            position: eye,
            speed,
        };

        let classes = [
            DrawableClass::Static,
            DrawableClass::Dynamic,
            DrawableClass::Animated,
        ];
        self.drawables = (0..24u64)
            .map(|i| {
                let spot = Vec3::new((i % 6) as f32 * 24.0, 2.0, (i / 6) as f32 * 30.0);
                VisibleDrawable {
                    handle: DrawableHandle(i),
                    class: classes[i as usize % classes.len()],
                    distance: spot.distance(eye),
                    casts_shadow: i % 5 != 0,
                }
            })
            .collect();
        self.water = frame % 3 == 0;
        self.sky_changed = frame % 4 == 0;
    }
}

impl SceneSource for DemoScene {
    fn camera(&self) -> CameraView {
        self.camera
    }

    fn light_view_proj(&self, level: u8) -> Mat4 {
        let extent = 40.0 * level as f32;
        Mat4::orthographic_rh(-extent, extent, -extent, extent, 1.0, 400.0)
            * Mat4::look_at_rh(Vec3::new(64.0, 200.0, 64.0), Vec3::new(64.0, 0.0, 64.0), Vec3::Z)
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
        _handle: DrawableHandle,
        pass: PassKind,
        encoder: &mut dyn CommandEncoder,
    ) -> Result<(), RenderError> {
        let index_buffer = self
            .cube
            .buffer(1)
            .ok_or_else(|| RenderError::MissingResource("cube indices".into()))?;
        let mut bound = self.cube.bind_attributes(encoder, &[0])?;
        // Shadow passes keep the depth program and light transform already bound.
        if !matches!(pass, PassKind::Shadow { .. }) {
            bound.set_shader(self.program);
        }
        bound.bind_index_buffer(index_buffer, IndexFormat::Uint32);
        bound.draw_indexed(0..36, 0, 0..1);
        bound.unbind_index_buffer();
        Ok(())
    }
}

fn register_programs(device: &HeadlessDevice, config: &PipelineConfig) {
    let shaders = &config.shaders;
    device.register_kernel(&shaders.chunk_cull, ChunkCullKernel::new(config.slots));
    for name in [
        &shaders.terrain,
        &shaders.shadow_depth,
        &shaders.deferred,
        &shaders.sky,
    ] {
        device.register_shader(name);
    }
    for filter in &config.filters {
        match &filter.kind {
            FilterKind::Single { shader } | FilterKind::Combine { shader } => {
                device.register_shader(shader);
            }
            FilterKind::Dual { first, second } => {
                device.register_shader(first);
                device.register_shader(second);
            }
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(LoggingConfig {
        env_filter: args.log.clone(),
        ..LoggingConfig::default()
    });

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading pipeline config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let device = Arc::new(HeadlessDevice::new());
    register_programs(&device, &config);

    let mut manager = RenderManager::new(device.clone(), device.clone(), config, WIDTH, HEIGHT)
        .context("building the frame pipeline")?;
    manager.set_debug_wireframe(args.wireframe);
    let terrain = TerrainMesh::grid(8, 8, 8, 2.0, |x, z| {
        (x * 0.08).sin() * (z * 0.06).cos() * 4.0 - 2.0
    });
    manager.add_terrain(&terrain)?;

    let mut scene = DemoScene::new(&device)?;
    for frame in 0..args.frames {
        scene.advance(frame);
        // Shadow casters refresh every other frame.
        let stats = manager.frame(&scene, frame % 2 == 0)?;
        log::info!(
            "frame {:>3}: {} draws, {} indirect, {} cull groups, {} filter passes, skipped {:?}",
            stats.frame,
            stats.draws,
            stats.indirect_draws,
            stats.cull_groups,
            stats.filter_passes,
            stats.stages_skipped
        );
    }

    if let Some(pass) = manager.terrain(0) {
        log::info!(
            "terrain: {} chunks, output capacity {} indices",
            pass.chunk_count(),
            pass.capacity()
        );
    }
    log::info!(
        "device: {} draws executed, {} groups dispatched, {} buffers live",
        device.draws().len(),
        device.dispatched_groups(),
        device.live_buffer_count()
    );
    Ok(())
}
