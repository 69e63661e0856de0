//! The recording context: translates portable commands into Vulkan
//! commands on one `vk::CommandBuffer`.

use crate::convert;
use crate::device::VulkanDevice;
use ash::vk;
use ember_render::buffer::{BufferTransition, MemoryTransition};
use ember_render::device::{CommandContext, DrawIndexedParams, RenderingInfo};
use ember_render::handle::{BufferHandle, DescriptorSetHandle, PipelineHandle, TextureHandle};
use ember_render::pipeline::{ScissorRect, Viewport};
use ember_render::renderpass::{
    AttachmentDescription, AttachmentReference, ClearValue, LoadOp, RenderPassSpec, StoreOp,
    SubpassSpec,
};
use ember_render::sync::PipelineStageFlags;
use ember_render::texture::{
    BufferTextureCopyRegion, TextureLayout, TextureTransition, TextureUsage,
};

pub(crate) struct VulkanCommandContext<'a> {
    device: &'a VulkanDevice,
    cmd: vk::CommandBuffer,
    in_render_pass: bool,
}

impl<'a> VulkanCommandContext<'a> {
    pub(crate) fn new(device: &'a VulkanDevice, cmd: vk::CommandBuffer) -> Self {
        VulkanCommandContext {
            device,
            cmd,
            in_render_pass: false,
        }
    }

    fn full_subresource_range(&self, texture: TextureHandle) -> vk::ImageSubresourceRange {
        self.device
            .textures
            .with(texture.raw(), |t| vk::ImageSubresourceRange {
                aspect_mask: convert::aspect_mask(t.spec.format),
                base_mip_level: 0,
                level_count: t.spec.mip_levels,
                base_array_layer: 0,
                layer_count: t.spec.dimensions.array_layers(),
            })
            .unwrap_or(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
    }

    fn image_barrier(
        &self,
        texture: TextureHandle,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        src_access: vk::AccessFlags,
        dst_access: vk::AccessFlags,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
    ) {
        let Some((image, _)) = self.device.vk_texture(texture) else {
            return;
        };
        let barrier = vk::ImageMemoryBarrier::builder()
            .image(image)
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .subresource_range(self.full_subresource_range(texture))
            .build();
        unsafe {
            self.device.device.cmd_pipeline_barrier(
                self.cmd,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }
}

/// Stage a texture sits in while occupying one of these layouts; used when
/// transitioning by layout rather than by usage.
fn layout_stage(layout: vk::ImageLayout) -> vk::PipelineStageFlags {
    match layout {
        vk::ImageLayout::UNDEFINED => vk::PipelineStageFlags::TOP_OF_PIPE,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL | vk::ImageLayout::TRANSFER_DST_OPTIMAL => {
            vk::PipelineStageFlags::TRANSFER
        }
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => {
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        }
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => {
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS
        }
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => {
            vk::PipelineStageFlags::VERTEX_SHADER | vk::PipelineStageFlags::FRAGMENT_SHADER
        }
        vk::ImageLayout::PRESENT_SRC_KHR => vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        _ => vk::PipelineStageFlags::ALL_COMMANDS,
    }
}

fn layout_access(layout: vk::ImageLayout) -> vk::AccessFlags {
    match layout {
        vk::ImageLayout::UNDEFINED => vk::AccessFlags::empty(),
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => vk::AccessFlags::TRANSFER_READ,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => vk::AccessFlags::TRANSFER_WRITE,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => {
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        }
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => {
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        }
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => vk::AccessFlags::SHADER_READ,
        vk::ImageLayout::PRESENT_SRC_KHR => vk::AccessFlags::MEMORY_READ,
        _ => vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
    }
}

fn clear_value(clear: ClearValue) -> vk::ClearValue {
    match clear {
        ClearValue::Color(float32) => vk::ClearValue {
            color: vk::ClearColorValue { float32 },
        },
        ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
        },
    }
}

impl<'a> CommandContext for VulkanCommandContext<'a> {
    /// Translates the rendering scope into a compatible render pass +
    /// framebuffer through the backend's translation caches and begins it.
    fn begin_rendering(&mut self, info: &RenderingInfo<'_>) {
        let mut spec = RenderPassSpec::default();
        let mut subpass = SubpassSpec::default();
        let mut textures = Vec::new();
        let mut clear_values = Vec::new();
        for att in info.color_attachments {
            subpass.color_refs.push(AttachmentReference {
                attachment: spec.attachments.len() as u32,
                layout: att.final_layout,
            });
            spec.attachments.push(AttachmentDescription {
                format: att.format,
                samples: att.samples,
                load_op: att.load_op,
                store_op: att.store_op,
                stencil_load_op: LoadOp::DontCare,
                stencil_store_op: StoreOp::DontCare,
                initial_layout: TextureLayout::Undefined,
                final_layout: att.final_layout,
            });
            textures.push(att.texture);
            clear_values.push(clear_value(att.clear));
        }
        if let Some(att) = info.depth_stencil_attachment {
            subpass.depth_stencil_ref = Some(AttachmentReference {
                attachment: spec.attachments.len() as u32,
                layout: att.final_layout,
            });
            spec.attachments.push(AttachmentDescription {
                format: att.format,
                samples: att.samples,
                load_op: att.load_op,
                store_op: att.store_op,
                stencil_load_op: LoadOp::DontCare,
                stencil_store_op: StoreOp::DontCare,
                initial_layout: TextureLayout::Undefined,
                final_layout: att.final_layout,
            });
            textures.push(att.texture);
            clear_values.push(clear_value(att.clear));
        }
        spec.subpasses.push(subpass);

        let render_pass = {
            let mut cache = self.device.rendering_passes.lock();
            match cache.get(&spec) {
                Some(&rp) => rp,
                None => match crate::pipeline::create_vk_render_pass(self.device, &spec) {
                    Ok(rp) => {
                        cache.insert(spec.clone(), rp);
                        rp
                    }
                    Err(err) => {
                        log::error!("begin_rendering: render pass creation failed: {}", err);
                        return;
                    }
                },
            }
        };

        let framebuffer = {
            let key = (spec.clone(), textures.clone(), info.render_area);
            let mut cache = self.device.rendering_framebuffers.lock();
            match cache.get(&key) {
                Some(&fb) => fb,
                None => {
                    let views: Option<Vec<vk::ImageView>> = textures
                        .iter()
                        .map(|&t| self.device.textures.with(t.raw(), |tex| tex.view))
                        .collect();
                    let Some(views) = views else {
                        log::error!("begin_rendering: stale attachment handle");
                        return;
                    };
                    let fb_info = vk::FramebufferCreateInfo::builder()
                        .render_pass(render_pass)
                        .attachments(&views)
                        .width(info.render_area.width)
                        .height(info.render_area.height)
                        .layers(1);
                    match unsafe { self.device.device.create_framebuffer(&fb_info, None) } {
                        Ok(fb) => {
                            cache.insert(key, fb);
                            fb
                        }
                        Err(err) => {
                            log::error!("begin_rendering: framebuffer creation failed: {:?}", err);
                            return;
                        }
                    }
                }
            }
        };

        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D {
                    width: info.render_area.width,
                    height: info.render_area.height,
                },
            })
            .clear_values(&clear_values);
        unsafe {
            self.device.device.cmd_begin_render_pass(
                self.cmd,
                &begin_info,
                vk::SubpassContents::INLINE,
            );
        }
        self.in_render_pass = true;

        // pipelines carry dynamic viewport/scissor; default to the full
        // render area, callbacks may override
        self.set_viewport(&Viewport {
            x: 0.0,
            y: 0.0,
            width: info.render_area.width as f32,
            height: info.render_area.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        self.set_scissor(&ScissorRect {
            x: 0,
            y: 0,
            width: info.render_area.width,
            height: info.render_area.height,
        });
    }

    fn end_rendering(&mut self) {
        if self.in_render_pass {
            unsafe { self.device.device.cmd_end_render_pass(self.cmd) };
            self.in_render_pass = false;
        }
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        let vp = vk::Viewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        };
        unsafe { self.device.device.cmd_set_viewport(self.cmd, 0, &[vp]) };
    }

    fn set_scissor(&mut self, scissor: &ScissorRect) {
        let rect = vk::Rect2D {
            offset: vk::Offset2D {
                x: scissor.x,
                y: scissor.y,
            },
            extent: vk::Extent2D {
                width: scissor.width,
                height: scissor.height,
            },
        };
        unsafe { self.device.device.cmd_set_scissor(self.cmd, 0, &[rect]) };
    }

    fn set_depth_bias(&mut self, constant_factor: f32, clamp: f32, slope_factor: f32) {
        unsafe {
            self.device
                .device
                .cmd_set_depth_bias(self.cmd, constant_factor, clamp, slope_factor)
        };
    }

    fn set_line_width(&mut self, width: f32) {
        unsafe { self.device.device.cmd_set_line_width(self.cmd, width) };
    }

    fn set_blend_constants(&mut self, constants: [f32; 4]) {
        unsafe {
            self.device
                .device
                .cmd_set_blend_constants(self.cmd, &constants)
        };
    }

    fn bind_pipeline(&mut self, pipeline: PipelineHandle, descriptor_sets: &[DescriptorSetHandle]) {
        let Some((raw, layout, bind_point)) = self
            .device
            .pipelines
            .with(pipeline.raw(), |p| (p.raw, p.layout, p.bind_point))
        else {
            log::error!("bind_pipeline: invalid handle {:?}", pipeline);
            return;
        };
        unsafe {
            self.device.device.cmd_bind_pipeline(self.cmd, bind_point, raw);
        }
        let sets: Vec<vk::DescriptorSet> = descriptor_sets
            .iter()
            .filter_map(|&s| self.device.descriptor_sets.get(s.raw()))
            .collect();
        if !sets.is_empty() {
            unsafe {
                self.device.device.cmd_bind_descriptor_sets(
                    self.cmd,
                    bind_point,
                    layout,
                    0,
                    &sets,
                    &[],
                );
            }
        }
    }

    fn bind_vertex_buffer(&mut self, buffer: BufferHandle, offset: u64) {
        let Some(raw) = self.device.vk_buffer(buffer) else {
            return;
        };
        unsafe {
            self.device
                .device
                .cmd_bind_vertex_buffers(self.cmd, 0, &[raw], &[offset]);
        }
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.device.device.cmd_draw(
                self.cmd,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
    }

    fn draw_indexed(&mut self, params: &DrawIndexedParams) {
        let Some(index_buffer) = self.device.vk_buffer(params.index_buffer) else {
            return;
        };
        unsafe {
            self.device.device.cmd_bind_index_buffer(
                self.cmd,
                index_buffer,
                params.offset,
                vk::IndexType::UINT32,
            );
            self.device.device.cmd_draw_indexed(
                self.cmd,
                params.index_count,
                params.instance_count,
                params.first_index,
                params.vertex_offset,
                params.first_instance,
            );
        }
    }

    fn draw_indexed_indirect(
        &mut self,
        indirect_buffer: BufferHandle,
        index_buffer: BufferHandle,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) {
        let (Some(indirect), Some(index)) = (
            self.device.vk_buffer(indirect_buffer),
            self.device.vk_buffer(index_buffer),
        ) else {
            return;
        };
        unsafe {
            self.device
                .device
                .cmd_bind_index_buffer(self.cmd, index, 0, vk::IndexType::UINT32);
            self.device.device.cmd_draw_indexed_indirect(
                self.cmd,
                indirect,
                offset,
                draw_count,
                stride,
            );
        }
    }

    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        unsafe {
            self.device
                .device
                .cmd_dispatch(self.cmd, group_count_x, group_count_y, group_count_z);
        }
    }

    fn dispatch_indirect(&mut self, indirect_buffer: BufferHandle, offset: u64) {
        let Some(raw) = self.device.vk_buffer(indirect_buffer) else {
            return;
        };
        unsafe {
            self.device
                .device
                .cmd_dispatch_indirect(self.cmd, raw, offset);
        }
    }

    fn copy_buffer(
        &mut self,
        src: BufferHandle,
        src_offset: u64,
        dst: BufferHandle,
        dst_offset: u64,
        size: u64,
    ) {
        let (Some(src_raw), Some(dst_raw)) =
            (self.device.vk_buffer(src), self.device.vk_buffer(dst))
        else {
            return;
        };
        let region = vk::BufferCopy {
            src_offset,
            dst_offset,
            size,
        };
        unsafe {
            self.device
                .device
                .cmd_copy_buffer(self.cmd, src_raw, dst_raw, &[region]);
        }
    }

    fn copy_buffer_to_texture(
        &mut self,
        src: BufferHandle,
        dst: TextureHandle,
        regions: &[BufferTextureCopyRegion],
    ) {
        let (Some(src_raw), Some((dst_image, dst_spec))) =
            (self.device.vk_buffer(src), self.device.vk_texture(dst))
        else {
            return;
        };
        let copies: Vec<vk::BufferImageCopy> = regions
            .iter()
            .map(|r| vk::BufferImageCopy {
                buffer_offset: r.buffer_offset,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: convert::aspect_mask(dst_spec.format),
                    mip_level: r.mip_level,
                    base_array_layer: r.base_array_layer,
                    layer_count: r.layer_count.max(1),
                },
                image_offset: vk::Offset3D {
                    x: r.texture_offset.width as i32,
                    y: r.texture_offset.height as i32,
                    z: r.texture_offset.depth as i32,
                },
                image_extent: vk::Extent3D {
                    width: r.texture_extent.width,
                    height: r.texture_extent.height,
                    depth: r.texture_extent.depth.max(1),
                },
            })
            .collect();
        unsafe {
            self.device.device.cmd_copy_buffer_to_image(
                self.cmd,
                src_raw,
                dst_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &copies,
            );
        }
    }

    fn blit_texture(
        &mut self,
        src: TextureHandle,
        src_usage: TextureUsage,
        dst: TextureHandle,
        dst_usage: TextureUsage,
    ) {
        let (Some((src_image, src_spec)), Some((dst_image, dst_spec))) =
            (self.device.vk_texture(src), self.device.vk_texture(dst))
        else {
            return;
        };

        // move both images into transfer layouts from their declared usages
        self.image_barrier(
            src,
            convert::texture_usage_layout(src_usage),
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            convert::texture_usage_access(src_usage),
            vk::AccessFlags::TRANSFER_READ,
            convert::pipeline_stages(src_usage.pipeline_stages()),
            vk::PipelineStageFlags::TRANSFER,
        );
        self.image_barrier(
            dst,
            convert::texture_usage_layout(dst_usage),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            convert::texture_usage_access(dst_usage),
            vk::AccessFlags::TRANSFER_WRITE,
            convert::pipeline_stages(dst_usage.pipeline_stages()),
            vk::PipelineStageFlags::TRANSFER,
        );

        let src_extent = src_spec.dimensions.extent();
        let dst_extent = dst_spec.dimensions.extent();
        let blit = vk::ImageBlit {
            src_subresource: vk::ImageSubresourceLayers {
                aspect_mask: convert::aspect_mask(src_spec.format),
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            src_offsets: [
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D {
                    x: src_extent.width as i32,
                    y: src_extent.height as i32,
                    z: 1,
                },
            ],
            dst_subresource: vk::ImageSubresourceLayers {
                aspect_mask: convert::aspect_mask(dst_spec.format),
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            dst_offsets: [
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D {
                    x: dst_extent.width as i32,
                    y: dst_extent.height as i32,
                    z: 1,
                },
            ],
        };
        unsafe {
            self.device.device.cmd_blit_image(
                self.cmd,
                src_image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[blit],
                vk::Filter::LINEAR,
            );
        }
    }

    fn gen_texture_mipmaps(&mut self, texture: TextureHandle) {
        let Some((image, spec)) = self.device.vk_texture(texture) else {
            return;
        };
        let aspect = convert::aspect_mask(spec.format);
        let layers = spec.dimensions.array_layers();
        let mut width = spec.dimensions.width();
        let mut height = spec.dimensions.height();

        for level in 1..spec.mip_levels {
            // previous level becomes the blit source
            let barrier = vk::ImageMemoryBarrier::builder()
                .image(image)
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::TRANSFER_READ)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: aspect,
                    base_mip_level: level - 1,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: layers,
                })
                .build();
            unsafe {
                self.device.device.cmd_pipeline_barrier(
                    self.cmd,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[barrier],
                );
            }

            let next_width = (width / 2).max(1);
            let next_height = (height / 2).max(1);
            let blit = vk::ImageBlit {
                src_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: aspect,
                    mip_level: level - 1,
                    base_array_layer: 0,
                    layer_count: layers,
                },
                src_offsets: [
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D {
                        x: width as i32,
                        y: height as i32,
                        z: 1,
                    },
                ],
                dst_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: aspect,
                    mip_level: level,
                    base_array_layer: 0,
                    layer_count: layers,
                },
                dst_offsets: [
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D {
                        x: next_width as i32,
                        y: next_height as i32,
                        z: 1,
                    },
                ],
            };
            unsafe {
                self.device.device.cmd_blit_image(
                    self.cmd,
                    image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[blit],
                    vk::Filter::LINEAR,
                );
            }
            width = next_width;
            height = next_height;
        }

        // leave the whole chain shader-readable
        let final_barrier = vk::ImageMemoryBarrier::builder()
            .image(image)
            .old_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .src_access_mask(vk::AccessFlags::TRANSFER_READ)
            .dst_access_mask(vk::AccessFlags::SHADER_READ)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: spec.mip_levels.max(1) - 1,
                base_array_layer: 0,
                layer_count: layers,
            })
            .build();
        let last_barrier = vk::ImageMemoryBarrier::builder()
            .image(image)
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::SHADER_READ)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: spec.mip_levels.max(1) - 1,
                level_count: 1,
                base_array_layer: 0,
                layer_count: layers,
            })
            .build();
        unsafe {
            self.device.device.cmd_pipeline_barrier(
                self.cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[final_barrier, last_barrier],
            );
        }
    }

    fn add_transitions(
        &mut self,
        src_stages: PipelineStageFlags,
        dst_stages: PipelineStageFlags,
        memory: &[MemoryTransition],
        buffers: &[BufferTransition],
        textures: &[TextureTransition],
    ) {
        let memory_barriers: Vec<vk::MemoryBarrier> = memory
            .iter()
            .map(|m| {
                vk::MemoryBarrier::builder()
                    .src_access_mask(convert::buffer_usage_access(m.src_usage))
                    .dst_access_mask(convert::buffer_usage_access(m.dst_usage))
                    .build()
            })
            .collect();
        let buffer_barriers: Vec<vk::BufferMemoryBarrier> = buffers
            .iter()
            .filter_map(|b| {
                let raw = self.device.vk_buffer(b.buffer)?;
                Some(
                    vk::BufferMemoryBarrier::builder()
                        .buffer(raw)
                        .src_access_mask(convert::buffer_usage_access(b.src_usage))
                        .dst_access_mask(convert::buffer_usage_access(b.dst_usage))
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .offset(0)
                        .size(vk::WHOLE_SIZE)
                        .build(),
                )
            })
            .collect();
        let image_barriers: Vec<vk::ImageMemoryBarrier> = textures
            .iter()
            .filter_map(|t| {
                let (image, _) = self.device.vk_texture(t.texture)?;
                Some(
                    vk::ImageMemoryBarrier::builder()
                        .image(image)
                        .old_layout(convert::texture_usage_layout(t.src_usage))
                        .new_layout(convert::texture_usage_layout(t.dst_usage))
                        .src_access_mask(convert::texture_usage_access(t.src_usage))
                        .dst_access_mask(convert::texture_usage_access(t.dst_usage))
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .subresource_range(self.full_subresource_range(t.texture))
                        .build(),
                )
            })
            .collect();

        if memory_barriers.is_empty() && buffer_barriers.is_empty() && image_barriers.is_empty() {
            return;
        }
        unsafe {
            self.device.device.cmd_pipeline_barrier(
                self.cmd,
                convert::pipeline_stages(src_stages),
                convert::pipeline_stages(dst_stages),
                vk::DependencyFlags::empty(),
                &memory_barriers,
                &buffer_barriers,
                &image_barriers,
            );
        }
    }

    /// Transition by explicit layout; the source is the transfer-destination
    /// layout uploads and blits leave images in, which is the one caller of
    /// this op in the frame loop.
    fn add_texture_transition(&mut self, texture: TextureHandle, new_layout: TextureLayout) {
        let new = convert::texture_layout(new_layout);
        let old = vk::ImageLayout::TRANSFER_DST_OPTIMAL;
        self.image_barrier(
            texture,
            old,
            new,
            layout_access(old),
            layout_access(new),
            layout_stage(old),
            layout_stage(new),
        );
    }
}
