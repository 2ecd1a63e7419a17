use log::{debug, info, trace};

use crate::config::Settings;
use crate::constants::*;
use crate::error::{Result, SlimeError};
use crate::kernels::{self, SimulationKernel};
use crate::layout::{FrameData, SimulationParameters};
use crate::orchestrator::{DispatchPlan, FramePasses, SimulateStep};
use crate::resources::{self, FieldResources};
use crate::spawn;

/// Holds the wgpu pipelines and the run's field resources.
pub struct Simulation {
    visualize_bind_group: wgpu::BindGroup,
    visualize_pipeline: wgpu::RenderPipeline,

    simulate_bind_group: wgpu::BindGroup,
    simulate_pipeline: wgpu::ComputePipeline,

    resources: FieldResources,
    staging_belt: wgpu::util::StagingBelt,
    kernel: SimulationKernel,
}

impl Simulation {
    /// Compiles `kernel`, reporting compile errors with their diagnostics
    /// instead of aborting through the uncaptured error handler.
    fn compile<T>(
        device: &wgpu::Device,
        kernel: &str,
        build: impl FnOnce() -> T,
    ) -> Result<T> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let built = build();
        match pollster::block_on(device.pop_error_scope()) {
            Some(error) => Err(SlimeError::KernelCompile {
                kernel: kernel.to_owned(),
                diagnostics: error.to_string(),
            }),
            None => Ok(built),
        }
    }

    fn setup_simulate(
        device: &wgpu::Device,
        kernel: SimulationKernel,
        plan: &DispatchPlan,
    ) -> Result<(wgpu::BindGroupLayout, wgpu::ComputePipeline)> {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Simulate bind group layout"),
            entries: &resources::simulate_layout_entries(),
        });

        let pipeline = Self::compile(device, kernel.name(), || {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(kernel.name()),
                source: wgpu::ShaderSource::Wgsl(kernel.source(plan.divisor())),
            });

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Simulate pipeline layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Simulate pipeline"),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: SIMULATE_ENTRY_POINT,
                compilation_options: Default::default(),
                cache: None,
            })
        })?;

        Ok((bind_group_layout, pipeline))
    }

    fn setup_visualize(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
    ) -> Result<(wgpu::BindGroupLayout, wgpu::RenderPipeline)> {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Visualize bind group layout"),
            entries: &resources::visualize_layout_entries(),
        });

        let pipeline = Self::compile(device, "visualize", || {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("visualize"),
                source: wgpu::ShaderSource::Wgsl(kernels::VISUALIZE_SOURCE.into()),
            });

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Visualize pipeline layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Visualize pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: VISUALIZE_VERTEX_ENTRY_POINT,
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: VISUALIZE_FRAGMENT_ENTRY_POINT,
                    targets: &[Some(surface_format.into())],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        })?;

        Ok((bind_group_layout, pipeline))
    }

    /// Builds the parameter record, spawns the population and allocates
    /// every device resource. Nothing here is repeated for the rest of the run.
    pub fn init(
        settings: &Settings,
        plan: &DispatchPlan,
        surface_format: wgpu::TextureFormat,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<Self> {
        let kernel = settings.simulation_shader;
        let capabilities = kernel.capabilities();
        info!(
            "simulate kernel `{}` (senses trail: {}, diffuses trail: {})",
            kernel, capabilities.senses_trail, capabilities.diffuses_trail
        );

        let max_groups = device.limits().max_compute_workgroups_per_dimension;
        if plan.workgroups() > max_groups {
            return Err(SlimeError::Resource(format!(
                "{} work-groups exceed the device limit of {max_groups}; raise dispatchDivisor",
                plan.workgroups()
            )));
        }

        let params = SimulationParameters::from_settings(settings);
        let (_seed, agents) = spawn::generate_for(settings);
        let resources = FieldResources::new(device, queue, &params, agents)?;

        let (simulate_layout, simulate_pipeline) = Self::setup_simulate(device, kernel, plan)?;
        let (visualize_layout, visualize_pipeline) = Self::setup_visualize(device, surface_format)?;

        let simulate_bind_group = resources.simulate_bind_group(device, &simulate_layout);
        let visualize_bind_group = resources.visualize_bind_group(device, &visualize_layout);

        let extent = resources.extent();
        debug!(
            "bound {}x{} fields, {} agents, {} groups of {}",
            extent.width,
            extent.height,
            resources.agent_count(),
            plan.workgroups(),
            plan.divisor()
        );

        Ok(Simulation {
            visualize_bind_group,
            visualize_pipeline,
            simulate_bind_group,
            simulate_pipeline,
            resources,
            staging_belt: wgpu::util::StagingBelt::new(std::mem::size_of::<FrameData>() as u64 * 16),
            kernel,
        })
    }

    pub fn kernel(&self) -> SimulationKernel {
        self.kernel
    }

    /// Starts recording a frame that renders into `target`.
    pub fn frame<'a>(
        &'a mut self,
        device: &'a wgpu::Device,
        queue: &'a wgpu::Queue,
        target: wgpu::SurfaceTexture,
    ) -> GpuFrame<'a> {
        let view = target
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        GpuFrame {
            encoder: Some(device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame encoder"),
            })),
            simulation: self,
            device,
            queue,
            view,
            target: Some(target),
            scope_open: true,
        }
    }
}

/// One frame's worth of recorded device work.
pub struct GpuFrame<'a> {
    simulation: &'a mut Simulation,
    device: &'a wgpu::Device,
    queue: &'a wgpu::Queue,
    encoder: Option<wgpu::CommandEncoder>,
    view: wgpu::TextureView,
    target: Option<wgpu::SurfaceTexture>,
    scope_open: bool,
}

fn recording<'e>(
    encoder: &'e mut Option<wgpu::CommandEncoder>,
    phase: &'static str,
) -> Result<&'e mut wgpu::CommandEncoder> {
    encoder.as_mut().ok_or(SlimeError::Dispatch {
        phase,
        reason: "frame already submitted".into(),
    })
}

impl FramePasses for GpuFrame<'_> {
    fn visualize(&mut self) -> Result<()> {
        let Simulation {
            visualize_pipeline,
            visualize_bind_group,
            ..
        } = &*self.simulation;
        let view = &self.view;
        let encoder = recording(&mut self.encoder, "visualize")?;

        encoder.push_debug_group("visualize fields");
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Visualize pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            rpass.set_pipeline(visualize_pipeline);
            rpass.set_bind_group(0, visualize_bind_group, &[]);
            rpass.draw(0..FULL_FIELD_VERTICES, 0..1);
        }
        encoder.pop_debug_group();
        Ok(())
    }

    fn simulate(&mut self, step: &SimulateStep) -> Result<()> {
        let device = self.device;
        let frame_data = FrameData {
            time: step.time,
            frame: step.frame,
        };
        let size = wgpu::BufferSize::new(std::mem::size_of::<FrameData>() as _).ok_or(
            SlimeError::Dispatch {
                phase: "simulate",
                reason: "empty frame data".into(),
            },
        )?;

        let encoder = recording(&mut self.encoder, "simulate")?;
        let simulation = &mut *self.simulation;
        simulation
            .staging_belt
            .write_buffer(
                encoder,
                simulation.resources.frame_data_buffer(),
                0,
                size,
                device,
            )
            .copy_from_slice(bytemuck::bytes_of(&frame_data));

        encoder.push_debug_group("simulate step");
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Simulate pass"),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&simulation.simulate_pipeline);
            cpass.set_bind_group(0, &simulation.simulate_bind_group, &[]);
            cpass.dispatch_workgroups(step.workgroups, 1, 1);
        }
        encoder.pop_debug_group();
        Ok(())
    }

    fn barrier(&mut self) -> Result<()> {
        let encoder = self.encoder.take().ok_or(SlimeError::Dispatch {
            phase: "barrier",
            reason: "frame already submitted".into(),
        })?;

        self.simulation.staging_belt.finish();
        let submission = self.queue.submit(Some(encoder.finish()));
        let status = self
            .device
            .poll(wgpu::Maintain::WaitForSubmissionIndex(submission));
        trace!("barrier reached, queue empty: {}", status.is_queue_empty());
        self.simulation.staging_belt.recall();

        self.scope_open = false;
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(SlimeError::Dispatch {
                phase: "frame",
                reason: error.to_string(),
            });
        }
        Ok(())
    }

    fn present(&mut self) {
        if let Some(target) = self.target.take() {
            target.present();
        }
    }
}

impl Drop for GpuFrame<'_> {
    fn drop(&mut self) {
        // Keep the error scope stack balanced when a frame is abandoned early.
        if self.scope_open {
            let _ = pollster::block_on(self.device.pop_error_scope());
        }
    }
}
