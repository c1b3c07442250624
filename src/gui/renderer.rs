//! Blits RGBA frames onto their windows.

use std::rc::Rc;
use std::sync::OnceLock;

use wgpu::*;
use winit::{dpi::PhysicalSize, event_loop::EventLoopWindowTarget, window::WindowBuilder};

use crate::image::Resolution;

const BACKGROUND: Color = Color::BLACK;

/// Connection to the graphics device, shared by every window.
pub struct Gpu {
    instance: Instance,
    adapter: Adapter,
    device: Device,
    queue: Queue,
}

impl Gpu {
    /// Returns the process-wide GPU context, opening it on first use.
    pub fn get() -> &'static Gpu {
        static GPU: OnceLock<Gpu> = OnceLock::new();
        GPU.get_or_init(|| pollster::block_on(Gpu::open()).unwrap())
    }

    async fn open() -> anyhow::Result<Gpu> {
        let instance = Instance::new(InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&RequestAdapterOptions::default())
            .await
            .ok_or_else(|| anyhow::anyhow!("no compatible graphics adapter found"))?;
        let info = adapter.get_info();
        log::debug!("opened {:?} graphics adapter: {}", info.backend, info.name);

        let (device, queue) = adapter
            .request_device(&DeviceDescriptor::default(), None)
            .await?;
        Ok(Gpu {
            instance,
            adapter,
            device,
            queue,
        })
    }
}

#[derive(Clone)]
pub struct Window {
    pub(super) win: Rc<winit::window::Window>,
    resolution: Resolution,
}

impl Window {
    pub fn open<T>(
        event_loop: &EventLoopWindowTarget<T>,
        title: &str,
        resolution: Resolution,
    ) -> anyhow::Result<Self> {
        let win = WindowBuilder::new()
            .with_resizable(false)
            .with_inner_size(PhysicalSize::new(resolution.width(), resolution.height()))
            .with_title(title)
            .build(event_loop)?;
        Ok(Self {
            win: Rc::new(win),
            resolution,
        })
    }
}

struct FrameTexture {
    inner: wgpu::Texture,
    view: TextureView,
    size: Extent3d,
}

impl FrameTexture {
    fn empty(gpu: &Gpu) -> Self {
        let size = Extent3d::default();
        let (inner, view) = Self::alloc(gpu, size);
        Self { inner, view, size }
    }

    fn alloc(gpu: &Gpu, size: Extent3d) -> (wgpu::Texture, TextureView) {
        let inner = gpu.device.create_texture(&TextureDescriptor {
            label: Some("frame"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8UnormSrgb,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = inner.create_view(&TextureViewDescriptor::default());
        (inner, view)
    }

    /// Uploads `data` into the texture, growing or shrinking it to `size` first.
    ///
    /// Returns `true` when the texture was reallocated and its bind group has to be recreated.
    fn update(&mut self, gpu: &Gpu, size: Extent3d, data: &[u8]) -> bool {
        assert_eq!((size.width * size.height * 4) as usize, data.len());

        let reallocated = self.size != size;
        if reallocated {
            log::trace!(
                "reallocating frame texture ({}x{} -> {}x{})",
                self.size.width,
                self.size.height,
                size.width,
                size.height,
            );
            (self.inner, self.view) = Self::alloc(gpu, size);
            self.size = size;
        }

        gpu.queue.write_texture(
            ImageCopyTexture {
                texture: &self.inner,
                mip_level: 0,
                origin: Origin3d::ZERO,
                aspect: TextureAspect::All,
            },
            data,
            ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(size.width * 4),
                rows_per_image: None,
            },
            size,
        );

        reallocated
    }
}

pub struct Renderer {
    gpu: &'static Gpu,
    surface: Surface,
    pipeline: RenderPipeline,

    texture: FrameTexture,

    bind_group_layout: BindGroupLayout,
    bind_group: BindGroup,

    /// Declared last; `surface` has to be dropped before the window it belongs to.
    window: Window,
}

impl Renderer {
    pub fn new(window: Window, gpu: &'static Gpu) -> anyhow::Result<Self> {
        let surface = unsafe { gpu.instance.create_surface(&*window.win)? };
        let surface_format = *surface
            .get_capabilities(&gpu.adapter)
            .formats
            .first()
            .ok_or_else(|| anyhow::anyhow!("surface reports no supported texture formats"))?;

        let shader = gpu.device.create_shader_module(ShaderModuleDescriptor {
            label: Some("fullscreen blit"),
            source: ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
        });

        let bind_group_layout = gpu
            .device
            .create_bind_group_layout(&BindGroupLayoutDescriptor {
                label: None,
                entries: &[
                    BindGroupLayoutEntry {
                        binding: 0,
                        visibility: ShaderStages::FRAGMENT,
                        ty: BindingType::Texture {
                            sample_type: TextureSampleType::Float { filterable: true },
                            view_dimension: TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    BindGroupLayoutEntry {
                        binding: 1,
                        visibility: ShaderStages::FRAGMENT,
                        ty: BindingType::Sampler(SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let pipeline = gpu
            .device
            .create_render_pipeline(&RenderPipelineDescriptor {
                label: Some("textured_quad"),
                layout: Some(
                    &gpu.device.create_pipeline_layout(&PipelineLayoutDescriptor {
                        label: None,
                        bind_group_layouts: &[&bind_group_layout],
                        push_constant_ranges: &[],
                    }),
                ),
                vertex: VertexState {
                    module: &shader,
                    entry_point: "vert",
                    buffers: &[],
                },
                fragment: Some(FragmentState {
                    module: &shader,
                    entry_point: "frag",
                    targets: &[Some(ColorTargetState {
                        format: surface_format,
                        write_mask: ColorWrites::ALL,
                        blend: None,
                    })],
                }),
                primitive: PrimitiveState::default(),
                depth_stencil: None,
                multisample: Default::default(),
                multiview: None,
            });

        let texture = FrameTexture::empty(gpu);
        let bind_group = Self::bind(gpu, &bind_group_layout, &texture);

        let mut this = Self {
            gpu,
            surface,
            pipeline,

            texture,

            bind_group_layout,
            bind_group,

            window,
        };
        this.recreate_swapchain();
        Ok(this)
    }

    fn bind(gpu: &Gpu, layout: &BindGroupLayout, texture: &FrameTexture) -> BindGroup {
        // Frames can be smaller or larger than the window, so sample with interpolation.
        let sampler = gpu.device.create_sampler(&SamplerDescriptor {
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            ..Default::default()
        });
        gpu.device.create_bind_group(&BindGroupDescriptor {
            label: None,
            layout,
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: BindingResource::TextureView(&texture.view),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: BindingResource::Sampler(&sampler),
                },
            ],
        })
    }

    pub fn redraw(&mut self) {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(err @ (SurfaceError::Outdated | SurfaceError::Lost)) => {
                log::debug!("stale surface ({err}), reconfiguring");
                self.recreate_swapchain();
                self.surface
                    .get_current_texture()
                    .expect("surface did not recover after reconfiguration")
            }
            Err(e) => panic!("could not acquire output frame: {e}"),
        };
        let view = frame.texture.create_view(&TextureViewDescriptor::default());
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&CommandEncoderDescriptor { label: None });
        {
            let mut rpass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: None,
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(BACKGROUND),
                        store: true,
                    },
                })],
                depth_stencil_attachment: None,
            });

            rpass.set_pipeline(&self.pipeline);
            rpass.set_bind_group(0, &self.bind_group, &[]);
            rpass.draw(0..3, 0..1);
        }

        self.gpu.queue.submit([encoder.finish()]);
        frame.present();
    }

    pub fn update_texture(&mut self, res: Resolution, data: &[u8]) {
        let size = Extent3d {
            width: res.width(),
            height: res.height(),
            depth_or_array_layers: 1,
        };
        if self.texture.update(self.gpu, size, data) {
            // The bind group references the old allocation and has to be rebuilt.
            self.bind_group = Self::bind(self.gpu, &self.bind_group_layout, &self.texture);
        }
    }

    pub fn window(&self) -> &winit::window::Window {
        &self.window.win
    }

    fn recreate_swapchain(&mut self) {
        let surface_format = *self
            .surface
            .get_capabilities(&self.gpu.adapter)
            .formats
            .first()
            .expect("surface reports no supported texture formats");
        let res = self.window.win.inner_size();
        log::debug!(
            "configuring {}x{} surface, format {:?}",
            res.width,
            res.height,
            surface_format,
        );
        if res.width != self.window.resolution.width()
            || res.height != self.window.resolution.height()
        {
            // The window is created non-resizable, so the platform should never report
            // a different size than the one we asked for.
            log::warn!(
                "window is {}x{} but the surface is configured for {}",
                res.width,
                res.height,
                self.window.resolution,
            );
        }
        let config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: self.window.resolution.width(),
            height: self.window.resolution.height(),
            present_mode: PresentMode::Fifo,
            alpha_mode: CompositeAlphaMode::Auto,
            view_formats: Vec::new(),
        };

        self.surface.configure(&self.gpu.device, &config);
    }
}
