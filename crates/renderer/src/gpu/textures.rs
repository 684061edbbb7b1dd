//! Per-cell GPU textures, one per gif frame, uploaded when a cell first
//! shows up in the draw list and dropped when the grid evicts it.

use std::collections::{HashMap, HashSet};

use wgpu::util::{DeviceExt, TextureDataOrder};

use wallgrid::{CellDraw, CellId};

use super::pipeline::OFFSCREEN_FORMAT;

pub(crate) struct CellTextureCache {
    entries: HashMap<CellId, CellTextures>,
}

struct CellTextures {
    bind_groups: Vec<wgpu::BindGroup>,
    _textures: Vec<wgpu::Texture>,
}

impl CellTextureCache {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Uploads every frame of the cell's gif on first sight.
    pub(crate) fn ensure(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        cell: &CellDraw,
        sampler: &wgpu::Sampler,
        layout: &wgpu::BindGroupLayout,
    ) {
        if self.entries.contains_key(&cell.id) {
            return;
        }

        let frames = cell.image.frames();
        let mut textures = Vec::with_capacity(frames.len());
        let mut bind_groups = Vec::with_capacity(frames.len());
        for (index, frame) in frames.iter().enumerate() {
            let texture = device.create_texture_with_data(
                queue,
                &wgpu::TextureDescriptor {
                    label: Some(&format!("cell frame #{index}")),
                    size: wgpu::Extent3d {
                        width: cell.image.width(),
                        height: cell.image.height(),
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: OFFSCREEN_FORMAT,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                },
                TextureDataOrder::LayerMajor,
                &frame.rgba,
            );
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            bind_groups.push(device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("cell frame bind group"),
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
            }));
            textures.push(texture);
        }

        self.entries.insert(
            cell.id,
            CellTextures {
                bind_groups,
                _textures: textures,
            },
        );
    }

    pub(crate) fn bind_group(&self, id: CellId, frame: usize) -> Option<&wgpu::BindGroup> {
        let entry = self.entries.get(&id)?;
        entry
            .bind_groups
            .get(frame)
            .or_else(|| entry.bind_groups.last())
    }

    /// Frees textures for cells no longer in the draw list.
    pub(crate) fn prune(&mut self, live: &[CellDraw]) {
        let live: HashSet<CellId> = live.iter().map(|cell| cell.id).collect();
        self.entries.retain(|id, _| live.contains(id));
    }
}
