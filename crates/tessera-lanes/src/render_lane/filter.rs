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

//! The post-filter chain: full-screen passes that read earlier targets and
//! write their own.

use super::{RenderTarget, TargetError};
use std::sync::Arc;
use tessera_core::config::{FilterConfig, FilterKind, BUILTIN_TARGETS};
use tessera_core::renderer::{
    CommandEncoder, FilterMode, GraphicsDevice, RenderError, ShaderId, ShaderLibrary, TextureId,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("filter '{filter}' reads '{input}', which is not a known target")]
    UnknownInput { filter: String, input: String },
    #[error("filter '{filter}' reads '{input}', which is produced later in the chain")]
    ForwardReference { filter: String, input: String },
    #[error("filter '{0}' reads its own output")]
    SelfReference(String),
    #[error("filter '{filter}' takes {expected} input(s) but was given {actual}")]
    InputCount {
        filter: String,
        expected: &'static str,
        actual: usize,
    },
    #[error("filter name '{0}' is used twice or shadows a built-in target")]
    DuplicateName(String),
    #[error("filter program '{0}' is not in the shader library")]
    MissingShader(String),
    #[error("filter input '{0}' has no texture this frame")]
    MissingInput(String),
    #[error(transparent)]
    Target(#[from] TargetError),
}

impl From<FilterError> for RenderError {
    fn from(err: FilterError) -> Self {
        match err {
            FilterError::MissingShader(name) => RenderError::MissingShader(name),
            FilterError::MissingInput(name) => RenderError::MissingResource(name),
            FilterError::Target(err) => err.into(),
            other => RenderError::ContractViolation(other.to_string()),
        }
    }
}

/// The resolved operation of one chain stage.
#[derive(Debug)]
pub enum FilterStage {
    Single {
        shader: ShaderId,
    },
    /// Two programs back to back; `first` writes `intermediate`, `second`
    /// reads it.
    Dual {
        first: ShaderId,
        second: ShaderId,
        intermediate: RenderTarget,
    },
    Combine {
        shader: ShaderId,
    },
}

#[derive(Debug)]
struct Stage {
    name: String,
    inputs: Vec<String>,
    op: FilterStage,
    output: RenderTarget,
}

/// An ordered list of full-screen passes. Each stage may read the built-in
/// targets and the output of any stage before it.
#[derive(Debug)]
pub struct FilterChain {
    stages: Vec<Stage>,
}

impl FilterChain {
    /// Checks stage names and input wiring without touching the device.
    pub fn validate(configs: &[FilterConfig]) -> Result<(), FilterError> {
        for (i, config) in configs.iter().enumerate() {
            let earlier = &configs[..i];
            if BUILTIN_TARGETS.contains(&config.name.as_str())
                || earlier.iter().any(|c| c.name == config.name)
            {
                return Err(FilterError::DuplicateName(config.name.clone()));
            }

            let (expected, ok) = match config.kind {
                FilterKind::Single { .. } | FilterKind::Dual { .. } => {
                    ("exactly 1", config.inputs.len() == 1)
                }
                FilterKind::Combine { .. } => ("at least 1", !config.inputs.is_empty()),
            };
            if !ok {
                return Err(FilterError::InputCount {
                    filter: config.name.clone(),
                    expected,
                    actual: config.inputs.len(),
                });
            }

            for input in &config.inputs {
                if *input == config.name {
                    return Err(FilterError::SelfReference(config.name.clone()));
                }
                if BUILTIN_TARGETS.contains(&input.as_str())
                    || earlier.iter().any(|c| c.name == *input)
                {
                    continue;
                }
                let filter = config.name.clone();
                let input = input.clone();
                return Err(if configs[i + 1..].iter().any(|c| c.name == input) {
                    FilterError::ForwardReference { filter, input }
                } else {
                    FilterError::UnknownInput { filter, input }
                });
            }
        }
        Ok(())
    }

    /// Validates `configs`, resolves their programs and allocates one output
    /// target per stage at `width` x `height`.
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        configs: &[FilterConfig],
        shaders: &dyn ShaderLibrary,
        width: u32,
        height: u32,
    ) -> Result<Self, FilterError> {
        Self::validate(configs)?;
        let resolve = |name: &str| {
            shaders
                .shader(name)
                .ok_or_else(|| FilterError::MissingShader(name.to_owned()))
        };
        let color_target = |label: &str, config: &FilterConfig| {
            RenderTarget::builder(label, width, height)
                .color(0, config.format, FilterMode::Linear)?
                .build(device.clone())
        };

        let mut stages = Vec::with_capacity(configs.len());
        for config in configs {
            let op = match &config.kind {
                FilterKind::Single { shader } => FilterStage::Single {
                    shader: resolve(shader)?,
                },
                FilterKind::Dual { first, second } => FilterStage::Dual {
                    first: resolve(first)?,
                    second: resolve(second)?,
                    intermediate: color_target(&format!("{}.pass0", config.name), config)?,
                },
                FilterKind::Combine { shader } => FilterStage::Combine {
                    shader: resolve(shader)?,
                },
            };
            stages.push(Stage {
                name: config.name.clone(),
                inputs: config.inputs.clone(),
                op,
                output: color_target(&config.name, config)?,
            });
        }
        log::debug!(
            "FilterChain: Created {} stages at {width}x{height}",
            stages.len()
        );
        Ok(Self { stages })
    }

    /// Records every stage in order. `sources` resolves the built-in target
    /// names. Returns the number of full-screen passes recorded.
    pub fn run(
        &self,
        encoder: &mut dyn CommandEncoder,
        sources: &dyn Fn(&str) -> Option<TextureId>,
    ) -> Result<usize, FilterError> {
        let mut passes = 0;
        for (i, stage) in self.stages.iter().enumerate() {
            let mut inputs = Vec::with_capacity(stage.inputs.len());
            for name in &stage.inputs {
                let texture = self.stages[..i]
                    .iter()
                    .find(|s| s.name == *name)
                    .and_then(|s| s.output.color(0))
                    .or_else(|| sources(name.as_str()))
                    .ok_or_else(|| FilterError::MissingInput(name.clone()))?;
                inputs.push(texture);
            }

            match &stage.op {
                FilterStage::Single { shader } | FilterStage::Combine { shader } => {
                    full_screen_pass(encoder, &stage.output, *shader, &inputs);
                    passes += 1;
                }
                FilterStage::Dual {
                    first,
                    second,
                    intermediate,
                } => {
                    full_screen_pass(encoder, intermediate, *first, &inputs);
                    let between = intermediate
                        .color(0)
                        .ok_or_else(|| FilterError::MissingInput(intermediate.label().to_owned()))?;
                    full_screen_pass(encoder, &stage.output, *second, &[between]);
                    passes += 2;
                }
            }
        }
        Ok(passes)
    }

    /// The output texture of the stage called `name`.
    pub fn output(&self, name: &str) -> Option<TextureId> {
        self.stages
            .iter()
            .find(|s| s.name == name)
            .and_then(|s| s.output.color(0))
    }

    /// The output of the last stage, which is what gets presented.
    pub fn final_output(&self) -> Option<TextureId> {
        self.stages.last().and_then(|s| s.output.color(0))
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Number of full-screen passes one [`run`](Self::run) records.
    pub fn pass_count(&self) -> usize {
        self.stages
            .iter()
            .map(|s| match s.op {
                FilterStage::Dual { .. } => 2,
                _ => 1,
            })
            .sum()
    }
}

fn full_screen_pass(
    encoder: &mut dyn CommandEncoder,
    target: &RenderTarget,
    shader: ShaderId,
    inputs: &[TextureId],
) {
    target.begin_use(encoder);
    encoder.set_shader(shader);
    for (unit, texture) in inputs.iter().enumerate() {
        encoder.bind_texture(unit as u32, *texture);
    }
    encoder.draw_fullscreen();
    for unit in 0..inputs.len() {
        encoder.unbind_texture(unit as u32);
    }
}
