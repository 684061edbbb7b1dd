//! Frame assembly: owns the offscreen target and the pipelines, turns the
//! grid's draw list into GPU passes.

use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;

use wallgrid::{stars::STAR_ALPHA, CellDraw, Star};

use super::context::GpuContext;
use super::pipeline::{
    DynamicVertexBuffer, PostPipeline, QuadPipeline, QuadVertex, SceneGlobals, SolidPipeline,
    SolidVertex, OFFSCREEN_FORMAT,
};
use super::textures::CellTextureCache;

pub(crate) struct GpuState {
    context: GpuContext,
    globals: SceneGlobals,
    quad: QuadPipeline,
    solid: SolidPipeline,
    post: PostPipeline,
    offscreen: OffscreenTarget,
    textures: CellTextureCache,
    cell_vertices: DynamicVertexBuffer,
    star_vertices: DynamicVertexBuffer,
    buffer_size: (u32, u32),
}

impl GpuState {
    pub(crate) fn new<T>(
        target: &T,
        window_size: PhysicalSize<u32>,
        buffer_size: (u32, u32),
        crt_enabled: bool,
    ) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let context = GpuContext::new(target, window_size)?;
        let globals = SceneGlobals::new(&context.device, buffer_size);
        let quad = QuadPipeline::new(&context.device, &globals);
        let solid = SolidPipeline::new(&context.device, &globals);
        let offscreen = OffscreenTarget::new(&context.device, buffer_size);
        let post = PostPipeline::new(
            &context.device,
            context.surface_format,
            &offscreen.view,
            crt_enabled,
        );

        let cell_vertices =
            DynamicVertexBuffer::new(&context.device, "cell vertices", 64 * 1024);
        let star_vertices =
            DynamicVertexBuffer::new(&context.device, "star vertices", 64 * 1024);

        Ok(Self {
            context,
            globals,
            quad,
            solid,
            post,
            offscreen,
            textures: CellTextureCache::new(),
            cell_vertices,
            star_vertices,
            buffer_size,
        })
    }

    pub(crate) fn size(&self) -> PhysicalSize<u32> {
        self.context.size
    }

    pub(crate) fn resize(&mut self, window_size: PhysicalSize<u32>, buffer_size: (u32, u32)) {
        self.context.resize(window_size);
        if buffer_size != self.buffer_size {
            self.buffer_size = buffer_size;
            self.offscreen = OffscreenTarget::new(&self.context.device, buffer_size);
            self.post.rebind(&self.context.device, &self.offscreen.view);
            self.globals.set_resolution(&self.context.queue, buffer_size);
        }
    }

    pub(crate) fn render(
        &mut self,
        cells: &[CellDraw],
        stars: &[Star],
    ) -> Result<(), wgpu::SurfaceError> {
        self.textures.prune(cells);
        for cell in cells {
            self.textures.ensure(
                &self.context.device,
                &self.context.queue,
                cell,
                &self.quad.sampler,
                &self.quad.texture_layout,
            );
        }

        let star_data: Vec<SolidVertex> = stars.iter().flat_map(star_vertices).collect();
        let cell_data: Vec<QuadVertex> = cells.iter().flat_map(cell_vertices).collect();
        self.star_vertices.upload(
            &self.context.device,
            &self.context.queue,
            bytemuck::cast_slice(&star_data),
        );
        self.cell_vertices.upload(
            &self.context.device,
            &self.context.queue,
            bytemuck::cast_slice(&cell_data),
        );

        let frame = self.context.surface.get_current_texture()?;
        let surface_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("wall encoder"),
                });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("wall pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.offscreen.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            if !star_data.is_empty() {
                pass.set_pipeline(&self.solid.pipeline);
                pass.set_bind_group(0, &self.globals.bind_group, &[]);
                pass.set_vertex_buffer(0, self.star_vertices.slice());
                pass.draw(0..star_data.len() as u32, 0..1);
            }

            if !cell_data.is_empty() {
                pass.set_pipeline(&self.quad.pipeline);
                pass.set_bind_group(0, &self.globals.bind_group, &[]);
                pass.set_vertex_buffer(0, self.cell_vertices.slice());
                for (idx, cell) in cells.iter().enumerate() {
                    if let Some(bind_group) = self.textures.bind_group(cell.id, cell.frame) {
                        pass.set_bind_group(1, bind_group, &[]);
                        let start = (idx * 6) as u32;
                        pass.draw(start..start + 6, 0..1);
                    }
                }
            }
        }

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("post pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &surface_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.post.pipeline);
            pass.set_bind_group(0, &self.post.bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        self.context.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }
}

struct OffscreenTarget {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl OffscreenTarget {
    fn new(device: &wgpu::Device, size: (u32, u32)) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("wall buffer"),
            size: wgpu::Extent3d {
                width: size.0.max(1),
                height: size.1.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

fn cell_vertices(cell: &CellDraw) -> [QuadVertex; 6] {
    let opacity = cell.opacity as f32 / 255.0;
    let (left, top) = (cell.x, cell.y);
    let (right, bottom) = (cell.x + cell.width, cell.y + cell.height);
    let corner = |x: f32, y: f32, u: f32, v: f32| QuadVertex {
        position: [x, y],
        uv: [u, v],
        opacity,
    };
    [
        corner(left, top, 0.0, 0.0),
        corner(left, bottom, 0.0, 1.0),
        corner(right, top, 1.0, 0.0),
        corner(right, top, 1.0, 0.0),
        corner(left, bottom, 0.0, 1.0),
        corner(right, bottom, 1.0, 1.0),
    ]
}

fn star_vertices(star: &Star) -> [SolidVertex; 6] {
    let color = [1.0, 1.0, 1.0, STAR_ALPHA as f32 / 255.0];
    let half = star.size / 2.0;
    let (left, top) = (star.x - half, star.y - half);
    let (right, bottom) = (star.x + half, star.y + half);
    let corner = |x: f32, y: f32| SolidVertex {
        position: [x, y],
        color,
    };
    [
        corner(left, top),
        corner(left, bottom),
        corner(right, top),
        corner(right, top),
        corner(left, bottom),
        corner(right, bottom),
    ]
}
