//! Configuration types for thermal diffusion sessions.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::compute::{KernelParams, TextureFormat, WrapMode};

/// Top-level session configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Diffusion solver parameters.
    pub solver: SolverConfig,
    /// Pointer source parameters.
    pub source: SourceConfig,
    /// Post-effect compositor parameters.
    pub effect: EffectConfig,
}

impl SessionConfig {
    /// Parse a session from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a session from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.solver.validate()?;
        self.source.validate()?;
        self.effect.validate()
    }
}

/// Diffusion solver parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Thermal diffusion coefficient (0.1-500).
    pub thermal_diffuse_coef: f32,
    /// Heat added per unit of source intensity (0.1-200).
    pub adding_heat_intensity: f32,
    /// Grid spacing along X (0.001-10).
    pub delta_x: f32,
    /// Grid spacing along Y (0.001-10).
    pub delta_y: f32,
    /// Time step of one diffusion sub-step.
    pub delta_time: f32,
    /// Sub-steps per frame.
    pub iteration: u32,
    /// Right shift applied to the viewport size to get the field resolution.
    pub lod: u32,
    /// Value enforced on edge cells.
    pub boundary_value: f32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            thermal_diffuse_coef: 500.0,
            adding_heat_intensity: 10.0,
            delta_x: 5.0,
            delta_y: 5.0,
            delta_time: 0.01,
            iteration: 10,
            lod: 0,
            boundary_value: 0.0,
        }
    }
}

/// Largest supported level-of-detail shift.
pub const MAX_LOD: u32 = 15;

impl SolverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("thermal_diffuse_coef", self.thermal_diffuse_coef, 0.1, 500.0)?;
        check_range("adding_heat_intensity", self.adding_heat_intensity, 0.1, 200.0)?;
        check_range("delta_x", self.delta_x, 0.001, 10.0)?;
        check_range("delta_y", self.delta_y, 0.001, 10.0)?;
        if !(self.delta_time > 0.0) {
            return Err(ConfigError::InvalidTimeStep);
        }
        if self.lod > MAX_LOD {
            return Err(ConfigError::InvalidLod(self.lod));
        }
        if !self.boundary_value.is_finite() {
            return Err(ConfigError::OutOfRange {
                name: "boundary_value",
                value: self.boundary_value,
                min: f32::MIN,
                max: f32::MAX,
            });
        }
        Ok(())
    }

    /// Explicit-scheme stability number `dt * coef * (1/dx^2 + 1/dy^2)`.
    ///
    /// The scheme is stable for values up to 0.5.
    pub fn stability_number(&self) -> f32 {
        self.delta_time
            * self.thermal_diffuse_coef
            * (1.0 / (self.delta_x * self.delta_x) + 1.0 / (self.delta_y * self.delta_y))
    }

    /// Kernel parameters derived from this configuration.
    pub fn kernel_params(&self) -> KernelParams {
        KernelParams {
            thermal_diffuse_coef: self.thermal_diffuse_coef,
            delta_time: self.delta_time,
            adding_heat_intensity: self.adding_heat_intensity,
            delta_x: self.delta_x,
            delta_y: self.delta_y,
            boundary_value: self.boundary_value,
        }
    }
}

/// Pointer source parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Impulse radius in normalized viewport units.
    pub radius: f32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self { radius: 0.03 }
    }
}

impl SourceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.radius > 0.0) || !self.radius.is_finite() {
            return Err(ConfigError::InvalidRadius(self.radius));
        }
        Ok(())
    }
}

/// A single full-screen post-effect pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EffectPass {
    /// `rgb = 1 - rgb`
    Invert,
    /// Rec. 709 luma on every colour channel.
    Grayscale,
    /// `rgb *= factor`
    Gain { factor: f32 },
    /// Mean over a `(2r + 1)^2` neighbourhood.
    BoxBlur { radius: u32 },
    /// White where luma >= level, black elsewhere.
    Threshold { level: f32 },
}

/// Largest supported box blur radius.
pub const MAX_BLUR_RADIUS: u32 = 16;

/// Post-effect compositor parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectConfig {
    /// Passes applied in order.
    pub passes: Vec<EffectPass>,
    /// Composite the pass output (true) or the untouched input (false).
    pub show: bool,
    /// Format of the ping-pong and output buffers.
    pub format: TextureFormat,
    /// Wrap mode of the ping-pong and output buffers.
    pub wrap: WrapMode,
    /// Right shift applied to the input frame size.
    pub down_sample: u32,
    /// Key that toggles `show`.
    pub toggle_key: char,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            passes: Vec::new(),
            show: true,
            format: TextureFormat::ARGBFloat,
            wrap: WrapMode::Repeat,
            down_sample: 0,
            toggle_key: '6',
        }
    }
}

impl EffectConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.down_sample > MAX_LOD {
            return Err(ConfigError::InvalidLod(self.down_sample));
        }
        for (i, pass) in self.passes.iter().enumerate() {
            let valid = match *pass {
                EffectPass::Gain { factor } => factor.is_finite(),
                EffectPass::Threshold { level } => level.is_finite(),
                EffectPass::BoxBlur { radius } => radius <= MAX_BLUR_RADIUS,
                EffectPass::Invert | EffectPass::Grayscale => true,
            };
            if !valid {
                return Err(ConfigError::InvalidPass { index: i, pass: *pass });
            }
        }
        Ok(())
    }
}

fn check_range(name: &'static str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if !(min..=max).contains(&value) {
        return Err(ConfigError::OutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        name: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    #[error("Time step must be positive")]
    InvalidTimeStep,
    #[error("Level-of-detail shift {0} exceeds {MAX_LOD}")]
    InvalidLod(u32),
    #[error("Source radius must be positive, got {0}")]
    InvalidRadius(f32),
    #[error("Effect pass {index} has invalid parameters: {pass:?}")]
    InvalidPass { index: usize, pass: EffectPass },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
}
