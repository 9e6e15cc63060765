// ============================================================================
// SAMPLED TEXTURE: GPU texture + bind group with in-place upload
// ============================================================================

use crate::error::RenderError;

/// Bind group layout shared by the base and overlay textures:
/// binding 0 = texture, binding 1 = filtering sampler.
pub fn texture_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("sampled_tex_bgl"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

/// An RGBA8 texture the blend shader samples from.
pub struct SampledTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub bind_group: wgpu::BindGroup,
    pub width: u32,
    pub height: u32,
}

impl SampledTexture {
    /// Create a texture and upload `data` (`width * height * 4` bytes).
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        width: u32,
        height: u32,
        data: &[u8],
        label: &str,
    ) -> Result<Self, RenderError> {
        check_len(data, width, height)?;

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        write_rgba(queue, &texture, 0, 0, width, height, data);

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });

        Ok(Self {
            texture,
            view,
            bind_group,
            width,
            height,
        })
    }

    pub fn matches(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }

    /// Re-upload all pixels in place.  Texture and bind group are kept.
    pub fn upload_full(&self, queue: &wgpu::Queue, data: &[u8]) -> Result<(), RenderError> {
        check_len(data, self.width, self.height)?;
        write_rgba(queue, &self.texture, 0, 0, self.width, self.height, data);
        Ok(())
    }
}

fn check_len(data: &[u8], width: u32, height: u32) -> Result<(), RenderError> {
    let expected = width as usize * height as usize * 4;
    if width == 0 || height == 0 || data.len() != expected {
        return Err(RenderError::Resource(format!(
            "texture upload of {} bytes does not match {}x{}",
            data.len(),
            width,
            height
        )));
    }
    Ok(())
}

fn write_rgba(queue: &wgpu::Queue, texture: &wgpu::Texture, x: u32, y: u32, width: u32, height: u32, data: &[u8]) {
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d { x, y, z: 0 },
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
}

/// `bytes_per_row` for texture→buffer copies must be a multiple of 256.
pub fn aligned_bytes_per_row(width: u32) -> u32 {
    let unaligned = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    (unaligned + align - 1) / align * align
}

/// Strip row padding from a mapped readback buffer.
pub fn unpad_rows(padded: &[u8], width: u32, height: u32, padded_row: u32) -> Vec<u8> {
    let actual_row = (width * 4) as usize;
    let mut result = Vec::with_capacity(actual_row * height as usize);
    for y in 0..height as usize {
        let start = y * padded_row as usize;
        result.extend_from_slice(&padded[start..start + actual_row]);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_align_to_256_bytes() {
        assert_eq!(aligned_bytes_per_row(1), 256);
        assert_eq!(aligned_bytes_per_row(64), 256);
        assert_eq!(aligned_bytes_per_row(65), 512);
    }

    #[test]
    fn unpad_drops_trailing_bytes() {
        // 2x2 image, rows padded to 12 bytes
        let padded = [1, 1, 1, 1, 2, 2, 2, 2, 9, 9, 9, 9, 3, 3, 3, 3, 4, 4, 4, 4, 9, 9, 9, 9];
        assert_eq!(
            unpad_rows(&padded, 2, 2, 12),
            vec![1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4]
        );
    }

    #[test]
    fn length_mismatch_is_resource_error() {
        assert!(matches!(check_len(&[0; 12], 2, 2), Err(RenderError::Resource(_))));
        assert!(check_len(&[0; 16], 2, 2).is_ok());
    }
}
