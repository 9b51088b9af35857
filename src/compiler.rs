//! Shader compilation.
//!
//! Source text is WGSL. It is parsed and validated with naga and written out
//! as SPIR-V words, which is the bytecode format every [`DeviceAdapter`]
//! accepts. The entry point's vertex inputs are reflected at the same time so
//! that input layouts can be matched against them later.
//!
//! [`DeviceAdapter`]: crate::device::DeviceAdapter

use std::fmt;

use crate::error::CompileError;

/// Pipeline stage a shader is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

impl ShaderStage {
    fn to_naga(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Pixel => naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Pixel => f.write_str("pixel"),
        }
    }
}

/// Compilation target parsed from a profile string such as `vs_5_0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderProfile {
    pub stage: ShaderStage,
    pub major: u8,
    pub minor: u8,
}

impl ShaderProfile {
    /// Parse `<stage>_<major>_<minor>`, where stage is `vs` or `ps`.
    ///
    /// Returns `None` for anything else.
    pub fn parse(profile: &str) -> Option<Self> {
        let mut parts = profile.split('_');
        let stage = match parts.next()? {
            "vs" => ShaderStage::Vertex,
            "ps" => ShaderStage::Pixel,
            _ => return None,
        };
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            stage,
            major,
            minor,
        })
    }

    /// SPIR-V version emitted for this profile.
    pub fn spirv_version(&self) -> (u8, u8) {
        if self.major >= 6 {
            (1, 3)
        } else {
            (1, 0)
        }
    }
}

/// Compile option flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompileFlags(u32);

impl CompileFlags {
    /// Emit debug names into the bytecode.
    pub const DEBUG: Self = Self(1 << 0);
    /// Skip semantic validation beyond what code generation needs.
    pub const SKIP_VALIDATION: Self = Self(1 << 1);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl Default for CompileFlags {
    fn default() -> Self {
        Self::DEBUG
    }
}

impl std::ops::BitOr for CompileFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// A vertex input of the compiled entry point.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderInput {
    pub name: String,
    pub location: u32,
}

/// Compiled shader bytecode plus the reflection data the device needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledShader {
    /// SPIR-V words.
    pub words: Vec<u32>,
    pub stage: ShaderStage,
    pub entry_point: String,
    /// Vertex inputs ordered by location. Empty for pixel shaders.
    pub inputs: Vec<ShaderInput>,
}

impl CompiledShader {
    pub fn byte_len(&self) -> usize {
        self.words.len() * 4
    }
}

/// Turns shader source into bytecode.
pub trait ShaderCompiler: Send + Sync {
    /// Compile one entry point of `source`.
    ///
    /// `path` is used only to annotate diagnostics.
    fn compile(
        &self,
        source: &str,
        path: &str,
        entry_point: &str,
        profile: &ShaderProfile,
        flags: CompileFlags,
    ) -> Result<CompiledShader, CompileError>;
}

/// WGSL compiler backed by naga, producing SPIR-V.
#[derive(Debug, Clone, Copy, Default)]
pub struct NagaCompiler;

impl NagaCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl ShaderCompiler for NagaCompiler {
    fn compile(
        &self,
        source: &str,
        path: &str,
        entry_point: &str,
        profile: &ShaderProfile,
        flags: CompileFlags,
    ) -> Result<CompiledShader, CompileError> {
        let module = naga::front::wgsl::parse_str(source)
            .map_err(|e| CompileError::new(e.emit_to_string_with_path(source, path)))?;

        let validation = if flags.contains(CompileFlags::SKIP_VALIDATION) {
            naga::valid::ValidationFlags::empty()
        } else {
            naga::valid::ValidationFlags::all()
        };
        let mut validator =
            naga::valid::Validator::new(validation, naga::valid::Capabilities::all());
        let info = validator
            .validate(&module)
            .map_err(|e| CompileError::new(e.emit_to_string_with_path(source, path)))?;

        let naga_stage = profile.stage.to_naga();
        let entry = module
            .entry_points
            .iter()
            .find(|ep| ep.name == entry_point && ep.stage == naga_stage)
            .ok_or_else(|| {
                CompileError::new(format!(
                    "error: entry point '{entry_point}' not found for {} stage\n  ┌─ {path}",
                    profile.stage
                ))
            })?;
        let inputs = match profile.stage {
            ShaderStage::Vertex => reflect_inputs(&module, entry),
            ShaderStage::Pixel => Vec::new(),
        };

        let mut writer_flags = naga::back::spv::WriterFlags::empty();
        if flags.contains(CompileFlags::DEBUG) {
            writer_flags |= naga::back::spv::WriterFlags::DEBUG;
        }
        let (major, minor) = profile.spirv_version();
        let options = naga::back::spv::Options {
            lang_version: (major, minor),
            flags: writer_flags,
            ..Default::default()
        };
        let pipeline_options = naga::back::spv::PipelineOptions {
            shader_stage: naga_stage,
            entry_point: entry_point.to_string(),
        };

        let words = naga::back::spv::write_vec(&module, &info, &options, Some(&pipeline_options))
            .map_err(|e| CompileError::new(format!("error: SPIR-V generation failed: {e}\n  ┌─ {path}")))?;

        log::debug!(
            "NagaCompiler: compiled {path}:{entry_point} ({} words, {} inputs)",
            words.len(),
            inputs.len()
        );

        Ok(CompiledShader {
            words,
            stage: profile.stage,
            entry_point: entry_point.to_string(),
            inputs,
        })
    }
}

/// Collect `@location` inputs of an entry point, including those nested in
/// an input struct.
fn reflect_inputs(module: &naga::Module, entry: &naga::EntryPoint) -> Vec<ShaderInput> {
    let mut inputs = Vec::new();

    for argument in &entry.function.arguments {
        match argument.binding {
            Some(naga::Binding::Location { location, .. }) => inputs.push(ShaderInput {
                name: argument.name.clone().unwrap_or_default(),
                location,
            }),
            Some(naga::Binding::BuiltIn(_)) => {}
            None => {
                if let naga::TypeInner::Struct { ref members, .. } = module.types[argument.ty].inner
                {
                    for member in members {
                        if let Some(naga::Binding::Location { location, .. }) = member.binding {
                            inputs.push(ShaderInput {
                                name: member.name.clone().unwrap_or_default(),
                                location,
                            });
                        }
                    }
                }
            }
        }
    }

    inputs.sort_by_key(|input| input.location);
    inputs
}
