//! GPU-resident mesh and texture for one loaded model.
//!
//! Replacing the mesh or texture destroys the previous GPU objects right away
//! instead of waiting for the last handle to drop. Uploads that exceed the
//! device limits are skipped with a warning and the previous data stays.

use std::borrow::Cow;
use std::sync::mpsc;

use asset::{MeshData, MeshVertex, TextureData};
use wgpu::{
    util::DeviceExt, AddressMode, BindGroup, BindGroupLayout, Buffer, BufferUsages, Device,
    Extent3d, FilterMode, IndexFormat, Limits, Queue, Sampler, SamplerDescriptor, Texture,
    TextureDescriptor, TextureDimension, TextureFormat, TextureUsages, TextureView,
    VertexBufferLayout, VertexStepMode,
};

use crate::RendererError;

/// Interleaved position/normal/uv at slots 0/1/2, 32-byte stride.
pub const VERTEX_LAYOUT: VertexBufferLayout<'static> = VertexBufferLayout {
    array_stride: std::mem::size_of::<MeshVertex>() as u64,
    step_mode: VertexStepMode::Vertex,
    attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2],
};

pub const INDEX_FORMAT: IndexFormat = IndexFormat::Uint32;

/// Linear format: texels reach the shader exactly as stored, no sRGB decode.
pub const TEXTURE_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

/// Fails when either mesh buffer would exceed `max_buffer_size`.
pub fn check_mesh_limits(
    limits: &Limits,
    vertex_count: usize,
    index_count: usize,
) -> Result<(), RendererError> {
    let vertex_bytes =
        (vertex_count as u64).saturating_mul(std::mem::size_of::<MeshVertex>() as u64);
    let index_bytes = (index_count as u64).saturating_mul(std::mem::size_of::<u32>() as u64);
    let bytes = vertex_bytes.max(index_bytes);
    if bytes > limits.max_buffer_size {
        return Err(RendererError::MeshTooLarge {
            bytes,
            max: limits.max_buffer_size,
        });
    }
    Ok(())
}

/// Fails when either side exceeds `max_texture_dimension_2d`.
pub fn check_texture_limits(
    limits: &Limits,
    width: u32,
    height: u32,
) -> Result<(), RendererError> {
    let max = limits.max_texture_dimension_2d;
    if width > max || height > max {
        return Err(RendererError::TextureTooLarge { width, height, max });
    }
    Ok(())
}

/// Static vertex + index buffers of a welded mesh.
pub struct MeshBuffers {
    pub vertex_buf: Buffer,
    pub index_buf: Buffer,
    pub vertex_count: u32,
    pub index_count: u32,
}

impl MeshBuffers {
    fn destroy(self) {
        self.vertex_buf.destroy();
        self.index_buf.destroy();
    }
}

/// Uploaded RGBA8 texture with its nearest/clamp sampler.
pub struct GpuTexture {
    pub texture: Texture,
    pub view: TextureView,
    pub sampler: Sampler,
    pub width: u32,
    pub height: u32,
}

/// Texture together with the bind group the model pipeline samples from.
pub struct BoundTexture {
    pub texture: GpuTexture,
    pub bind_group: BindGroup,
}

impl BoundTexture {
    pub fn new(device: &Device, layout: &BindGroupLayout, texture: GpuTexture) -> Self {
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Model Texture BG"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&texture.sampler),
                },
            ],
        });
        Self {
            texture,
            bind_group,
        }
    }

    fn destroy(self) {
        self.texture.texture.destroy();
    }
}

/// Mesh + optional texture consumed by [`crate::model::ModelRenderer`].
#[derive(Default)]
pub struct RenderData {
    mesh: Option<MeshBuffers>,
    texture: Option<BoundTexture>,
}

impl RenderData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upload a welded mesh, replacing any previous one.
    /// A mesh without indices clears the current mesh; one the device cannot
    /// hold is skipped and the current mesh stays.
    pub fn build(&mut self, device: &Device, mesh: &MeshData) {
        let limits = device.limits();
        if let Err(err) = check_mesh_limits(&limits, mesh.vertices.len(), mesh.indices.len()) {
            log::warn!("Mesh upload skipped: {err}");
            return;
        }
        if let Some(old) = self.mesh.take() {
            old.destroy();
        }

        if !mesh.is_valid() {
            log::warn!(
                "Mesh has {} vertices / {} indices; nothing to draw",
                mesh.vertices.len(),
                mesh.indices.len()
            );
            return;
        }

        let vertex_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Model VB"),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: BufferUsages::VERTEX,
        });
        let index_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Model IB"),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: BufferUsages::INDEX,
        });

        log::info!(
            "Uploaded mesh: {} vertices, {} indices",
            mesh.vertices.len(),
            mesh.indices.len()
        );

        self.mesh = Some(MeshBuffers {
            vertex_buf,
            index_buf,
            vertex_count: mesh.vertices.len() as u32,
            index_count: mesh.indices.len() as u32,
        });
    }

    /// Upload the model texture, replacing any previous one.
    pub fn set_texture(
        &mut self,
        device: &Device,
        queue: &Queue,
        layout: &BindGroupLayout,
        tex: &TextureData,
        flip_vertically: bool,
    ) {
        if let Err(err) = check_texture_limits(&device.limits(), tex.width, tex.height) {
            log::warn!("Texture upload skipped: {err}");
            return;
        }
        if let Some(old) = self.texture.take() {
            old.destroy();
        }
        let gpu = upload_rgba8(device, queue, tex, flip_vertically);
        log::info!(
            "Uploaded texture {}x{} (flip={})",
            gpu.width,
            gpu.height,
            flip_vertically
        );
        self.texture = Some(BoundTexture::new(device, layout, gpu));
    }

    pub fn mesh(&self) -> Option<&MeshBuffers> {
        self.mesh.as_ref()
    }

    pub fn texture(&self) -> Option<&BoundTexture> {
        self.texture.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.mesh.is_some()
    }

    pub fn has_texture(&self) -> bool {
        self.texture.is_some()
    }

    pub fn index_count(&self) -> u32 {
        self.mesh.as_ref().map_or(0, |m| m.index_count)
    }

    pub fn vertex_count(&self) -> u32 {
        self.mesh.as_ref().map_or(0, |m| m.vertex_count)
    }
}

/// Create an RGBA8 texture with nearest filtering and clamp-to-edge wrapping.
/// With `flip_vertically` the bottom source row becomes row 0 (v = 0).
pub fn upload_rgba8(
    device: &Device,
    queue: &Queue,
    tex: &TextureData,
    flip_vertically: bool,
) -> GpuTexture {
    let pixels: Cow<'_, TextureData> = if flip_vertically {
        Cow::Owned(tex.flipped_vertically())
    } else {
        Cow::Borrowed(tex)
    };

    let size = Extent3d {
        width: tex.width.max(1),
        height: tex.height.max(1),
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&TextureDescriptor {
        label: Some("Model Texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: TEXTURE_FORMAT,
        usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST | TextureUsages::COPY_SRC,
        view_formats: &[],
    });

    if pixels.is_valid() {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &pixels.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(pixels.row_bytes() as u32),
                rows_per_image: Some(pixels.height),
            },
            size,
        );
    } else {
        log::warn!(
            "Texture {}x{} has {} bytes; left uninitialized",
            tex.width,
            tex.height,
            tex.data.len()
        );
    }

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = device.create_sampler(&SamplerDescriptor {
        label: Some("Model Sampler"),
        address_mode_u: AddressMode::ClampToEdge,
        address_mode_v: AddressMode::ClampToEdge,
        address_mode_w: AddressMode::ClampToEdge,
        mag_filter: FilterMode::Nearest,
        min_filter: FilterMode::Nearest,
        mipmap_filter: FilterMode::Nearest,
        ..Default::default()
    });

    GpuTexture {
        texture,
        view,
        sampler,
        width: size.width,
        height: size.height,
    }
}

/// Copy an RGBA8 texture back to tightly packed rows. Blocks until the GPU is done.
pub fn read_rgba8(
    device: &Device,
    queue: &Queue,
    texture: &Texture,
) -> Result<Vec<u8>, RendererError> {
    let (width, height) = (texture.width(), texture.height());
    let row = width * 4;
    let padded_row = row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
        * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Texture Readback"),
        size: padded_row as u64 * height as u64,
        usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_row),
                rows_per_image: Some(height),
            },
        },
        Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(Some(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device
        .poll(wgpu::PollType::Wait)
        .map_err(|e| RendererError::Readback(e.to_string()))?;
    rx.recv()
        .map_err(|e| RendererError::Readback(e.to_string()))?
        .map_err(|e| RendererError::Readback(e.to_string()))?;

    let mut out = Vec::with_capacity((row * height) as usize);
    {
        let mapped = slice.get_mapped_range();
        for chunk in mapped.chunks_exact(padded_row as usize) {
            out.extend_from_slice(&chunk[..row as usize]);
        }
    }
    staging.unmap();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_gpu::headless;

    #[test]
    fn vertex_layout_is_interleaved_32_bytes() {
        assert_eq!(VERTEX_LAYOUT.array_stride, 32);
        let offsets: Vec<(u32, u64)> = VERTEX_LAYOUT
            .attributes
            .iter()
            .map(|a| (a.shader_location, a.offset))
            .collect();
        assert_eq!(offsets, vec![(0, 0), (1, 12), (2, 24)]);
        assert_eq!(VERTEX_LAYOUT.attributes[2].format, wgpu::VertexFormat::Float32x2);
    }

    #[test]
    fn empty_render_data_is_not_loaded() {
        let rd = RenderData::new();
        assert!(!rd.is_loaded());
        assert!(!rd.has_texture());
        assert_eq!(rd.index_count(), 0);
    }

    #[test]
    fn oversized_mesh_is_rejected_by_limits() {
        let limits = Limits::downlevel_webgl2_defaults();
        // 9M vertices * 32 bytes > 256 MiB
        let err = check_mesh_limits(&limits, 9_000_000, 3).unwrap_err();
        assert!(matches!(
            err,
            RendererError::MeshTooLarge { bytes: 288_000_000, max } if max == limits.max_buffer_size
        ));
        // Index buffer is checked on its own.
        assert!(check_mesh_limits(&limits, 3, 80_000_000).is_err());
        assert!(check_mesh_limits(&limits, 1_000, 3_000).is_ok());
        assert!(check_mesh_limits(&limits, usize::MAX, 0).is_err());
    }

    #[test]
    fn oversized_texture_is_rejected_by_limits() {
        let limits = Limits::downlevel_webgl2_defaults();
        let max = limits.max_texture_dimension_2d;
        assert!(check_texture_limits(&limits, max, max).is_ok());
        assert!(matches!(
            check_texture_limits(&limits, max + 1, 1),
            Err(RendererError::TextureTooLarge { width, height: 1, .. }) if width == max + 1
        ));
        assert!(check_texture_limits(&limits, 1, max + 1).is_err());
    }

    #[test]
    fn oversized_texture_keeps_previous_one() {
        let Some((device, queue)) = headless() else {
            return;
        };
        let renderer = crate::ModelRenderer::new(&device, &queue, TextureFormat::Rgba8Unorm);
        let layout = renderer.texture_layout();
        let mut rd = RenderData::new();
        rd.set_texture(&device, &queue, layout, &checker_2x2(), false);
        assert!(rd.has_texture());

        let wide = device.limits().max_texture_dimension_2d + 1;
        let too_wide = TextureData::new_rgba8(wide, 1, vec![0; wide as usize * 4]).expect("row");
        rd.set_texture(&device, &queue, layout, &too_wide, false);
        let kept = rd.texture().expect("previous texture kept");
        assert_eq!((kept.texture.width, kept.texture.height), (2, 2));
    }

    fn checker_2x2() -> TextureData {
        #[rustfmt::skip]
        let data = vec![
            255, 0, 0, 255,     0, 255, 0, 255,
            0, 0, 255, 255,     255, 255, 255, 128,
        ];
        TextureData::new_rgba8(2, 2, data).expect("2x2")
    }

    #[test]
    fn texture_roundtrip_without_flip() {
        let Some((device, queue)) = headless() else {
            return;
        };
        let src = checker_2x2();
        let gpu = upload_rgba8(&device, &queue, &src, false);
        let back = read_rgba8(&device, &queue, &gpu.texture).expect("readback");
        assert_eq!(back, src.data);
    }

    #[test]
    fn texture_roundtrip_with_flip_reverses_rows() {
        let Some((device, queue)) = headless() else {
            return;
        };
        let src = checker_2x2();
        let gpu = upload_rgba8(&device, &queue, &src, true);
        let back = read_rgba8(&device, &queue, &gpu.texture).expect("readback");
        let mut expected = src.data[8..].to_vec();
        expected.extend_from_slice(&src.data[..8]);
        assert_eq!(back, expected);
    }

    #[test]
    fn rebuild_replaces_mesh() {
        let Some((device, _queue)) = headless() else {
            return;
        };
        let mut rd = RenderData::new();
        let tri = asset::obj::load_obj_from_str(
            "v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nvt 0 0\nf 1/1/1 2/1/1 3/1/1\n",
        );
        rd.build(&device, &tri);
        assert!(rd.is_loaded());
        assert_eq!((rd.vertex_count(), rd.index_count()), (3, 3));

        let single = asset::obj::load_obj_from_str("v 0 0 0\nvn 0 0 1\nvt 0 0\nf 1/1/1\n");
        rd.build(&device, &single);
        assert_eq!((rd.vertex_count(), rd.index_count()), (1, 1));

        rd.build(&device, &MeshData::default());
        assert!(!rd.is_loaded());
    }
}
