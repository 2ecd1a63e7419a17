//! Field textures and device buffers, allocated once per run.

use log::{debug, info};
use wgpu::util::DeviceExt;

use crate::constants::{FIELD_FORMAT, FIELD_TEXEL_SIZE};
use crate::error::{Result, SlimeError};
use crate::layout::{self, Agent, FrameData, SimulationParameters};

/// Binding numbers shared by the visualize and simulate kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingSlot {
    FrameData = 0,
    Trail = 1,
    AgentMap = 2,
    Parameters = 3,
    Agents = 4,
}

impl BindingSlot {
    pub const fn index(self) -> u32 {
        self as u32
    }
}

fn buffer_entry(
    slot: BindingSlot,
    visibility: wgpu::ShaderStages,
    ty: wgpu::BufferBindingType,
    min_size: u64,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding: slot.index(),
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(min_size),
        },
        count: None,
    }
}

fn storage_field_entry(slot: BindingSlot) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding: slot.index(),
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::ReadWrite,
            format: FIELD_FORMAT,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

fn sampled_field_entry(slot: BindingSlot) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding: slot.index(),
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

/// Simulate kernel inputs: time, both fields read-write, parameters, agents.
pub fn simulate_layout_entries() -> [wgpu::BindGroupLayoutEntry; 5] {
    [
        buffer_entry(
            BindingSlot::FrameData,
            wgpu::ShaderStages::COMPUTE,
            wgpu::BufferBindingType::Uniform,
            layout::FRAME_DATA_SIZE as u64,
        ),
        storage_field_entry(BindingSlot::Trail),
        storage_field_entry(BindingSlot::AgentMap),
        buffer_entry(
            BindingSlot::Parameters,
            wgpu::ShaderStages::COMPUTE,
            wgpu::BufferBindingType::Storage { read_only: true },
            layout::PARAMETERS_SIZE as u64,
        ),
        buffer_entry(
            BindingSlot::Agents,
            wgpu::ShaderStages::COMPUTE,
            wgpu::BufferBindingType::Storage { read_only: false },
            layout::AGENT_SIZE as u64,
        ),
    ]
}

/// Visualize kernel inputs: both fields and the parameters.
pub fn visualize_layout_entries() -> [wgpu::BindGroupLayoutEntry; 3] {
    [
        sampled_field_entry(BindingSlot::Trail),
        sampled_field_entry(BindingSlot::AgentMap),
        buffer_entry(
            BindingSlot::Parameters,
            wgpu::ShaderStages::FRAGMENT,
            wgpu::BufferBindingType::Storage { read_only: true },
            layout::PARAMETERS_SIZE as u64,
        ),
    ]
}

pub struct FieldResources {
    agent_count: u32,

    trail: wgpu::Texture,
    trail_view: wgpu::TextureView,
    agent_map: wgpu::Texture,
    agent_map_view: wgpu::TextureView,

    params_buffer: wgpu::Buffer,
    agent_buffer: wgpu::Buffer,
    frame_data_buffer: wgpu::Buffer,
}

impl FieldResources {
    /// Allocates both fields and all buffers and uploads the write-once data.
    ///
    /// `agents` is consumed: the host copy is released as soon as it has been
    /// uploaded and the device buffer becomes its only owner.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        params: &SimulationParameters,
        agents: Vec<Agent>,
    ) -> Result<Self> {
        let width = params.width as u32;
        let height = params.height as u32;
        let agent_count = u32::try_from(agents.len())
            .map_err(|_| SlimeError::Resource(format!("{} agents do not fit a dispatch", agents.len())))?;
        check_limits(&device.limits(), width, height, agent_count)?;

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let extent = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let field_descriptor = |label: &'static str| wgpu::TextureDescriptor {
            label: Some(label),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FIELD_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        };
        let trail = device.create_texture(&field_descriptor("Trail field"));
        let agent_map = device.create_texture(&field_descriptor("Agent field"));
        let trail_view = trail.create_view(&wgpu::TextureViewDescriptor::default());
        let agent_map_view = agent_map.create_view(&wgpu::TextureViewDescriptor::default());

        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Param buffer"),
            contents: params.as_bytes(),
            usage: wgpu::BufferUsages::STORAGE,
        });

        let agent_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Agent buffer"),
            contents: bytemuck::cast_slice(&agents),
            usage: wgpu::BufferUsages::STORAGE,
        });
        drop(agents);

        let frame_data_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame data buffer"),
            size: std::mem::size_of::<FrameData>() as _,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let resources = FieldResources {
            agent_count,
            trail,
            trail_view,
            agent_map,
            agent_map_view,
            params_buffer,
            agent_buffer,
            frame_data_buffer,
        };
        resources.clear_agent_map(queue);

        let validation = pollster::block_on(device.pop_error_scope());
        let out_of_memory = pollster::block_on(device.pop_error_scope());
        if let Some(error) = out_of_memory.or(validation) {
            return Err(SlimeError::Resource(error.to_string()));
        }

        info!(
            "allocated {}x{} fields and {} agents ({} bytes)",
            width,
            height,
            agent_count,
            resources.agent_buffer.size()
        );
        Ok(resources)
    }

    /// The agent field must start empty; the trail field is left as allocated.
    /// Zeros are uploaded in bands of rows so the host copy stays small.
    fn clear_agent_map(&self, queue: &wgpu::Queue) {
        let extent = self.agent_map.size();
        let bytes_per_row = extent.width * FIELD_TEXEL_SIZE;
        let bands = row_bands(extent.height, bytes_per_row, CLEAR_BAND_BYTES);
        let rows = bands.clone().map(|(_, rows)| rows).max().unwrap_or(0);
        let zeros = vec![0u8; bytes_per_row as usize * rows as usize];

        for (first_row, rows) in bands {
            queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &self.agent_map,
                    mip_level: 0,
                    origin: wgpu::Origin3d {
                        x: 0,
                        y: first_row,
                        z: 0,
                    },
                    aspect: wgpu::TextureAspect::All,
                },
                &zeros[..bytes_per_row as usize * rows as usize],
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(rows),
                },
                wgpu::Extent3d {
                    width: extent.width,
                    height: rows,
                    depth_or_array_layers: 1,
                },
            );
        }
        debug!("cleared agent field");
    }

    pub fn simulate_bind_group(
        &self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Simulate bind group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: BindingSlot::FrameData.index(),
                    resource: self.frame_data_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: BindingSlot::Trail.index(),
                    resource: wgpu::BindingResource::TextureView(&self.trail_view),
                },
                wgpu::BindGroupEntry {
                    binding: BindingSlot::AgentMap.index(),
                    resource: wgpu::BindingResource::TextureView(&self.agent_map_view),
                },
                wgpu::BindGroupEntry {
                    binding: BindingSlot::Parameters.index(),
                    resource: self.params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: BindingSlot::Agents.index(),
                    resource: self.agent_buffer.as_entire_binding(),
                },
            ],
        })
    }

    pub fn visualize_bind_group(
        &self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Visualize bind group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: BindingSlot::Trail.index(),
                    resource: wgpu::BindingResource::TextureView(&self.trail_view),
                },
                wgpu::BindGroupEntry {
                    binding: BindingSlot::AgentMap.index(),
                    resource: wgpu::BindingResource::TextureView(&self.agent_map_view),
                },
                wgpu::BindGroupEntry {
                    binding: BindingSlot::Parameters.index(),
                    resource: self.params_buffer.as_entire_binding(),
                },
            ],
        })
    }

    pub fn frame_data_buffer(&self) -> &wgpu::Buffer {
        &self.frame_data_buffer
    }

    pub fn agent_count(&self) -> u32 {
        self.agent_count
    }

    pub fn extent(&self) -> wgpu::Extent3d {
        self.trail.size()
    }
}

/// Upper bound on the host buffer used to clear a field.
const CLEAR_BAND_BYTES: u32 = 4 << 20;

/// Splits `height` rows into `(first_row, rows)` bands of at most `budget`
/// bytes each. A band always holds at least one row.
fn row_bands(height: u32, bytes_per_row: u32, budget: u32) -> impl Iterator<Item = (u32, u32)> + Clone {
    let per_band = (budget / bytes_per_row.max(1)).max(1);
    (0..height)
        .step_by(per_band as usize)
        .map(move |first| (first, per_band.min(height - first)))
}

/// Rejects fields and agent buffers the device cannot hold.
pub fn check_limits(limits: &wgpu::Limits, width: u32, height: u32, agent_count: u32) -> Result<()> {
    let max_side = limits.max_texture_dimension_2d;
    if width > max_side || height > max_side {
        return Err(SlimeError::Resource(format!(
            "field {width}x{height} exceeds the device limit of {max_side} texels per side"
        )));
    }
    if agent_count == 0 {
        return Err(SlimeError::Resource("agent buffer would be empty".into()));
    }
    let agent_bytes = layout::agent_buffer_size(agent_count);
    let max_binding = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
    if agent_bytes > max_binding {
        return Err(SlimeError::Resource(format!(
            "{agent_count} agents need {agent_bytes} bytes, device allows {max_binding}"
        )));
    }
    Ok(())
}
