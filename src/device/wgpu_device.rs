//! wgpu device adapter.
//!
//! wgpu reports creation errors asynchronously through the device error
//! handler. Each call here wraps the device work in its own error scopes and
//! pops them before returning, turning those reports into a synchronous
//! [`DeviceError`]. Error scopes are a device-wide stack, so calls must not
//! interleave; the adapter declares itself not thread safe and the cache
//! serializes it.

use std::borrow::Cow;
use std::sync::Arc;

use wgpu::util::DeviceExt;

use crate::compiler::{CompiledShader, ShaderStage};
use crate::decoder::{DecodedImage, PixelFormat};
use crate::error::{DeviceError, DeviceResult};

use super::{
    resolve_input_layout, validate_buffer, validate_bytecode, validate_image, BindFlags,
    BufferDescriptor, BufferUsage, CpuAccess, DeviceAdapter, InputElement, VertexFormat,
};

/// A sampled 2D texture and its default view.
#[derive(Debug)]
pub struct WgpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug)]
pub struct WgpuBuffer {
    pub buffer: wgpu::Buffer,
    pub descriptor: BufferDescriptor,
}

#[derive(Debug)]
pub struct WgpuShader {
    pub module: wgpu::ShaderModule,
    pub entry_point: String,
}

/// Vertex attributes for one interleaved vertex buffer.
#[derive(Debug, Clone)]
pub struct WgpuInputLayout {
    pub attributes: Vec<wgpu::VertexAttribute>,
    pub array_stride: u64,
}

impl WgpuInputLayout {
    /// Layout to plug into a render pipeline's vertex state.
    pub fn vertex_buffer_layout(&self) -> wgpu::VertexBufferLayout<'_> {
        wgpu::VertexBufferLayout {
            array_stride: self.array_stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &self.attributes,
        }
    }
}

/// Device adapter over a wgpu device and queue.
pub struct WgpuDevice {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    name: String,
}

impl WgpuDevice {
    /// Wrap an existing device, e.g. one shared with a renderer.
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            name: "wgpu".to_string(),
        }
    }

    /// Create a device without a surface on the default adapter.
    pub fn headless() -> DeviceResult<Self> {
        pollster::block_on(Self::headless_async())
    }

    async fn headless_async() -> DeviceResult<Self> {
        let instance = wgpu::Instance::default();

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| DeviceError::Internal("no suitable adapter found".to_string()))?;

        let info = adapter.get_info();
        log::info!("Found adapter: {} ({:?} backend)", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Resource Cache Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults(),
                },
                None,
            )
            .await
            .map_err(|e| DeviceError::Internal(e.to_string()))?;

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            name: format!("wgpu ({})", info.name),
        })
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    /// Run `f` inside out-of-memory and validation error scopes.
    fn scoped<T>(&self, f: impl FnOnce() -> T) -> DeviceResult<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());

        match oom.or(validation) {
            None => Ok(value),
            Some(wgpu::Error::OutOfMemory { .. }) => Err(DeviceError::OutOfMemory),
            Some(other) => Err(DeviceError::InvalidDescription(other.to_string())),
        }
    }

    fn convert_buffer_usage(descriptor: &BufferDescriptor) -> wgpu::BufferUsages {
        let mut usage = wgpu::BufferUsages::empty();
        if descriptor.bind_flags.contains(BindFlags::VERTEX) {
            usage |= wgpu::BufferUsages::VERTEX;
        }
        if descriptor.bind_flags.contains(BindFlags::INDEX) {
            usage |= wgpu::BufferUsages::INDEX;
        }
        if descriptor.bind_flags.contains(BindFlags::CONSTANT) {
            usage |= wgpu::BufferUsages::UNIFORM;
        }
        if descriptor.usage != BufferUsage::Immutable {
            usage |= wgpu::BufferUsages::COPY_DST;
        }
        usage
    }

    fn convert_vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
        match format {
            VertexFormat::Float32 => wgpu::VertexFormat::Float32,
            VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
            VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
            VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
            VertexFormat::Uint32 => wgpu::VertexFormat::Uint32,
            VertexFormat::Uint32x2 => wgpu::VertexFormat::Uint32x2,
            VertexFormat::Uint32x4 => wgpu::VertexFormat::Uint32x4,
            VertexFormat::Sint32 => wgpu::VertexFormat::Sint32,
            VertexFormat::Unorm8x4 => wgpu::VertexFormat::Unorm8x4,
            VertexFormat::Uint8x4 => wgpu::VertexFormat::Uint8x4,
        }
    }

    fn convert_pixel_format(format: PixelFormat) -> wgpu::TextureFormat {
        match format {
            PixelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        }
    }

    fn create_shader(&self, label: &str, shader: &CompiledShader, stage: ShaderStage) -> DeviceResult<WgpuShader> {
        validate_bytecode(shader)?;
        if shader.stage != stage {
            return Err(DeviceError::InvalidDescription(format!(
                "{} bytecode passed as a {stage} shader",
                shader.stage
            )));
        }

        let module = self.scoped(|| {
            self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::SpirV(Cow::Borrowed(&shader.words)),
            })
        })?;

        log::debug!("WgpuDevice: created {} shader {:?}", stage, label);
        Ok(WgpuShader {
            module,
            entry_point: shader.entry_point.clone(),
        })
    }
}

impl DeviceAdapter for WgpuDevice {
    type Texture = WgpuTexture;
    type Buffer = WgpuBuffer;
    type VertexShader = WgpuShader;
    type PixelShader = WgpuShader;
    type InputLayout = WgpuInputLayout;

    fn name(&self) -> &str {
        &self.name
    }

    fn create_texture_view(&self, label: &str, image: &DecodedImage) -> DeviceResult<WgpuTexture> {
        validate_image(image, self.device.limits().max_texture_dimension_2d)?;

        let size = wgpu::Extent3d {
            width: image.width,
            height: image.height,
            depth_or_array_layers: 1,
        };

        let texture = self.scoped(|| {
            let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: Self::convert_pixel_format(image.format),
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });

            self.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &image.pixels,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(image.row_pitch()),
                    rows_per_image: Some(image.height),
                },
                size,
            );
            texture
        })?;

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        log::debug!(
            "WgpuDevice: created texture {:?} ({}x{})",
            label,
            image.width,
            image.height
        );

        Ok(WgpuTexture {
            texture,
            view,
            width: image.width,
            height: image.height,
        })
    }

    fn create_buffer(
        &self,
        label: &str,
        descriptor: &BufferDescriptor,
        data: Option<&[u8]>,
    ) -> DeviceResult<WgpuBuffer> {
        validate_buffer(descriptor, data)?;
        let usage = Self::convert_buffer_usage(descriptor);

        let buffer = self.scoped(|| match data {
            Some(contents) => self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents,
                    usage,
                }),
            None => self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: descriptor.byte_size(),
                usage,
                mapped_at_creation: false,
            }),
        })?;

        Ok(WgpuBuffer {
            buffer,
            descriptor: *descriptor,
        })
    }

    fn write_buffer(&self, buffer: &WgpuBuffer, offset: u64, data: &[u8]) -> DeviceResult<()> {
        if buffer.descriptor.cpu_access != CpuAccess::Write {
            return Err(DeviceError::InvalidUsage(
                "buffer was not created with CPU write access".to_string(),
            ));
        }
        self.scoped(|| self.queue.write_buffer(&buffer.buffer, offset, data))
    }

    fn create_vertex_shader(&self, label: &str, shader: &CompiledShader) -> DeviceResult<WgpuShader> {
        self.create_shader(label, shader, ShaderStage::Vertex)
    }

    fn create_pixel_shader(&self, label: &str, shader: &CompiledShader) -> DeviceResult<WgpuShader> {
        self.create_shader(label, shader, ShaderStage::Pixel)
    }

    fn create_input_layout(
        &self,
        _label: &str,
        shader: &CompiledShader,
        elements: &[InputElement],
    ) -> DeviceResult<WgpuInputLayout> {
        let layout = resolve_input_layout(shader, elements)?;

        let attributes = layout
            .attributes
            .iter()
            .map(|attr| wgpu::VertexAttribute {
                format: Self::convert_vertex_format(attr.format),
                offset: attr.offset as u64,
                shader_location: attr.location,
            })
            .collect();

        Ok(WgpuInputLayout {
            attributes,
            array_stride: layout.stride as u64,
        })
    }
}
