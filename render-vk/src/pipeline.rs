//! Object construction: textures, render passes, framebuffers, pipeline
//! layouts, pipelines, and descriptor sets.

use crate::convert;
use crate::device::VulkanDevice;
use crate::map_vk_error;
use crate::resources::{allocate_memory, VkPipeline, VkTexture};
use ash::vk;
use ember_render::buffer::MemoryPlacement;
use ember_render::descriptor::{DescriptorResource, DescriptorSetLayoutSpec, DescriptorWrite};
use ember_render::error::{DeviceError, DeviceResult};
use ember_render::handle::{DescriptorSetHandle, ShaderHandle, TextureHandle};
use ember_render::pipeline::{ComputePipelineSpec, DynamicState, GraphicsPipelineSpec};
use ember_render::renderpass::{FramebufferSpec, RenderPassSpec};
use ember_render::texture::{Dimensions, TextureSpec};

const DESCRIPTOR_POOL_SET_COUNT: u32 = 1024;

pub(crate) fn create_texture(
    device: &VulkanDevice,
    spec: &TextureSpec,
) -> DeviceResult<TextureHandle> {
    let extent = spec.dimensions.extent();
    if extent.width == 0 || extent.height == 0 {
        return Err(DeviceError::InvalidSpec("texture extent is zero".into()));
    }
    let (image_type, view_type) = match spec.dimensions {
        Dimensions::Dim1d { .. } => (vk::ImageType::TYPE_1D, vk::ImageViewType::TYPE_1D),
        Dimensions::Dim1dArray { .. } => (vk::ImageType::TYPE_1D, vk::ImageViewType::TYPE_1D_ARRAY),
        Dimensions::Dim2d { .. } => (vk::ImageType::TYPE_2D, vk::ImageViewType::TYPE_2D),
        Dimensions::Dim2dArray { .. } => (vk::ImageType::TYPE_2D, vk::ImageViewType::TYPE_2D_ARRAY),
        Dimensions::Dim3d { .. } => (vk::ImageType::TYPE_3D, vk::ImageViewType::TYPE_3D),
        Dimensions::Cubemap { .. } => (vk::ImageType::TYPE_2D, vk::ImageViewType::CUBE),
        Dimensions::CubemapArray { .. } => (vk::ImageType::TYPE_2D, vk::ImageViewType::CUBE_ARRAY),
    };
    let mut flags = vk::ImageCreateFlags::empty();
    if spec.dimensions.is_cubemap() {
        flags |= vk::ImageCreateFlags::CUBE_COMPATIBLE;
    }
    let info = vk::ImageCreateInfo::builder()
        .image_type(image_type)
        .flags(flags)
        .format(convert::format(spec.format))
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: extent.depth,
        })
        .mip_levels(spec.mip_levels)
        .array_layers(spec.dimensions.array_layers())
        .samples(convert::sample_count(spec.samples))
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(convert::texture_usage(spec.usage))
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);
    let image = unsafe {
        device
            .device
            .create_image(&info, None)
            .map_err(map_vk_error)?
    };
    let requirements = unsafe { device.device.get_image_memory_requirements(image) };
    let memory = allocate_memory(
        &device.device,
        &device.memory_props,
        requirements,
        MemoryPlacement::DeviceLocal,
    )
    .map_err(|err| {
        unsafe { device.device.destroy_image(image, None) };
        err
    })?;
    unsafe {
        device
            .device
            .bind_image_memory(image, memory, 0)
            .map_err(map_vk_error)?;
    }
    let view = create_image_view(device, image, spec, view_type)?;
    let handle = device.textures.insert(VkTexture {
        image,
        memory: Some(memory),
        view,
        spec: *spec,
        owned: true,
    });
    Ok(TextureHandle::from_raw(handle).unwrap_or(TextureHandle::NULL))
}

pub(crate) fn create_image_view(
    device: &VulkanDevice,
    image: vk::Image,
    spec: &TextureSpec,
    view_type: vk::ImageViewType,
) -> DeviceResult<vk::ImageView> {
    let info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(view_type)
        .format(convert::format(spec.format))
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: convert::aspect_mask(spec.format),
            base_mip_level: 0,
            level_count: spec.mip_levels,
            base_array_layer: 0,
            layer_count: spec.dimensions.array_layers(),
        });
    unsafe {
        device
            .device
            .create_image_view(&info, None)
            .map_err(map_vk_error)
    }
}

pub(crate) fn create_vk_render_pass(
    device: &VulkanDevice,
    spec: &RenderPassSpec,
) -> DeviceResult<vk::RenderPass> {
    let attachments: Vec<vk::AttachmentDescription> = spec
        .attachments
        .iter()
        .map(|a| vk::AttachmentDescription {
            flags: vk::AttachmentDescriptionFlags::empty(),
            format: convert::format(a.format),
            samples: convert::sample_count(a.samples),
            load_op: convert::load_op(a.load_op),
            store_op: convert::store_op(a.store_op),
            stencil_load_op: convert::load_op(a.stencil_load_op),
            stencil_store_op: convert::store_op(a.stencil_store_op),
            initial_layout: convert::texture_layout(a.initial_layout),
            final_layout: convert::texture_layout(a.final_layout),
        })
        .collect();

    // reference arrays must outlive the subpass descriptions
    let mut color_refs: Vec<Vec<vk::AttachmentReference>> = Vec::new();
    let mut input_refs: Vec<Vec<vk::AttachmentReference>> = Vec::new();
    let mut depth_refs: Vec<Option<vk::AttachmentReference>> = Vec::new();
    for subpass in &spec.subpasses {
        color_refs.push(
            subpass
                .color_refs
                .iter()
                .map(|r| vk::AttachmentReference {
                    attachment: r.attachment,
                    layout: convert::texture_layout(r.layout),
                })
                .collect(),
        );
        input_refs.push(
            subpass
                .input_refs
                .iter()
                .map(|r| vk::AttachmentReference {
                    attachment: r.attachment,
                    layout: convert::texture_layout(r.layout),
                })
                .collect(),
        );
        depth_refs.push(subpass.depth_stencil_ref.map(|r| vk::AttachmentReference {
            attachment: r.attachment,
            layout: convert::texture_layout(r.layout),
        }));
    }
    let subpasses: Vec<vk::SubpassDescription> = spec
        .subpasses
        .iter()
        .enumerate()
        .map(|(i, _)| {
            let mut desc = vk::SubpassDescription::builder()
                .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                .color_attachments(&color_refs[i])
                .input_attachments(&input_refs[i]);
            if let Some(depth) = depth_refs[i].as_ref() {
                desc = desc.depth_stencil_attachment(depth);
            }
            desc.build()
        })
        .collect();

    let dependencies: Vec<vk::SubpassDependency> = spec
        .dependencies
        .iter()
        .map(|d| vk::SubpassDependency {
            src_subpass: d.src_subpass.unwrap_or(vk::SUBPASS_EXTERNAL),
            dst_subpass: d.dst_subpass.unwrap_or(vk::SUBPASS_EXTERNAL),
            src_stage_mask: convert::pipeline_stages(d.src_stages),
            dst_stage_mask: convert::pipeline_stages(d.dst_stages),
            src_access_mask: vk::AccessFlags::MEMORY_WRITE,
            dst_access_mask: vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
            dependency_flags: vk::DependencyFlags::BY_REGION,
        })
        .collect();

    let info = vk::RenderPassCreateInfo::builder()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);
    unsafe {
        device
            .device
            .create_render_pass(&info, None)
            .map_err(map_vk_error)
    }
}

pub(crate) fn create_vk_framebuffer(
    device: &VulkanDevice,
    spec: &FramebufferSpec,
) -> DeviceResult<vk::Framebuffer> {
    let render_pass = device
        .render_passes
        .get(spec.render_pass.raw())
        .ok_or(DeviceError::HandleInvalid(spec.render_pass.raw()))?;
    let views: Vec<vk::ImageView> = spec
        .attachments
        .iter()
        .map(|&t| {
            device
                .textures
                .with(t.raw(), |tex| tex.view)
                .ok_or(DeviceError::HandleInvalid(t.raw()))
        })
        .collect::<Result<_, _>>()?;
    let info = vk::FramebufferCreateInfo::builder()
        .render_pass(render_pass)
        .attachments(&views)
        .width(spec.extent.width)
        .height(spec.extent.height)
        .layers(spec.layers.max(1));
    unsafe {
        device
            .device
            .create_framebuffer(&info, None)
            .map_err(map_vk_error)
    }
}

pub(crate) fn get_or_create_set_layout(
    device: &VulkanDevice,
    spec: &DescriptorSetLayoutSpec,
) -> DeviceResult<vk::DescriptorSetLayout> {
    if let Some(&layout) = device.set_layouts.lock().get(spec) {
        return Ok(layout);
    }
    let bindings: Vec<vk::DescriptorSetLayoutBinding> = spec
        .bindings
        .iter()
        .map(|b| vk::DescriptorSetLayoutBinding {
            binding: b.binding,
            descriptor_type: convert::descriptor_type(b.ty),
            descriptor_count: b.count.max(1),
            stage_flags: convert::shader_stage_flags(b.stage_flags),
            p_immutable_samplers: std::ptr::null(),
        })
        .collect();
    let info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
    let layout = unsafe {
        device
            .device
            .create_descriptor_set_layout(&info, None)
            .map_err(map_vk_error)?
    };
    Ok(*device
        .set_layouts
        .lock()
        .entry(spec.clone())
        .or_insert(layout))
}

/// Pipeline layout per shader group; the same group hash always maps to
/// exactly one layout object.
pub(crate) fn get_or_create_pipeline_layout(
    device: &VulkanDevice,
    shader: ShaderHandle,
) -> DeviceResult<(vk::PipelineLayout, u64)> {
    let info = device
        .shaders
        .with(shader.raw(), |s| s.info.clone())
        .ok_or(DeviceError::HandleInvalid(shader.raw()))?;
    if let Some(existing) = device.pipeline_layouts.lock().get(&info.group_hash) {
        return Ok((existing.layout, info.group_hash));
    }

    let mut set_layouts = Vec::new();
    for (set_index, resources) in info.descriptor_sets.iter().enumerate() {
        let spec = DescriptorSetLayoutSpec::from_shader_resources(set_index as u32, resources);
        set_layouts.push(get_or_create_set_layout(device, &spec)?);
    }
    let mut push_constant_ranges = Vec::new();
    if let Some(range) = &info.push_constants {
        push_constant_ranges.push(vk::PushConstantRange {
            stage_flags: convert::shader_stage_flags(range.stage_flags),
            offset: 0,
            size: range.size,
        });
    }
    let layout_info = vk::PipelineLayoutCreateInfo::builder()
        .set_layouts(&set_layouts)
        .push_constant_ranges(&push_constant_ranges);
    let layout = unsafe {
        device
            .device
            .create_pipeline_layout(&layout_info, None)
            .map_err(map_vk_error)?
    };
    device
        .pipeline_layouts
        .lock()
        .insert(info.group_hash, crate::resources::VkPipelineLayout { layout });
    Ok((layout, info.group_hash))
}

struct SpecializationData {
    entries: Vec<vk::SpecializationMapEntry>,
    data: Vec<u8>,
}

fn build_specialization(
    spec: &ember_render::pipeline::SpecializationState,
) -> SpecializationData {
    let mut entries = Vec::new();
    let mut data = Vec::new();
    for (constant_id, bytes) in &spec.entries {
        entries.push(vk::SpecializationMapEntry {
            constant_id: *constant_id,
            offset: data.len() as u32,
            size: bytes.len(),
        });
        data.extend_from_slice(bytes);
    }
    SpecializationData { entries, data }
}

pub(crate) fn create_graphics_pipeline(
    device: &VulkanDevice,
    spec: &GraphicsPipelineSpec,
) -> DeviceResult<VkPipeline> {
    let (layout, _) = get_or_create_pipeline_layout(device, spec.shader)?;
    let render_pass = device
        .render_passes
        .get(spec.render_pass.raw())
        .ok_or(DeviceError::HandleInvalid(spec.render_pass.raw()))?;

    let specialization = build_specialization(&spec.specialization);
    let spec_info = vk::SpecializationInfo::builder()
        .map_entries(&specialization.entries)
        .data(&specialization.data)
        .build();

    let stages: Vec<vk::PipelineShaderStageCreateInfo> = device
        .shaders
        .with(spec.shader.raw(), |s| {
            s.modules
                .iter()
                .map(|m| {
                    let mut stage = vk::PipelineShaderStageCreateInfo::builder()
                        .stage(convert::shader_stage(m.stage))
                        .module(m.module)
                        .name(&m.entry_point);
                    if !specialization.entries.is_empty() {
                        stage = stage.specialization_info(&spec_info);
                    }
                    stage.build()
                })
                .collect()
        })
        .ok_or(DeviceError::HandleInvalid(spec.shader.raw()))?;

    let state = &spec.state;
    let vertex_bindings: Vec<vk::VertexInputBindingDescription> = state
        .vertex_input
        .bindings
        .iter()
        .map(|b| vk::VertexInputBindingDescription {
            binding: b.binding,
            stride: b.stride,
            input_rate: match b.input_rate {
                ember_render::vertex::VertexInputRate::Vertex => vk::VertexInputRate::VERTEX,
                ember_render::vertex::VertexInputRate::Instance => vk::VertexInputRate::INSTANCE,
            },
        })
        .collect();
    let vertex_attributes: Vec<vk::VertexInputAttributeDescription> = state
        .vertex_input
        .attributes
        .iter()
        .map(|a| vk::VertexInputAttributeDescription {
            location: a.location,
            binding: a.binding,
            format: convert::format(a.format),
            offset: a.offset,
        })
        .collect();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
        .vertex_binding_descriptions(&vertex_bindings)
        .vertex_attribute_descriptions(&vertex_attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(convert::primitive_topology(state.input_assembly.topology))
        .primitive_restart_enable(state.input_assembly.primitive_restart_enable);

    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewport_count(1)
        .scissor_count(1);

    let raster = &state.rasterization;
    let mut rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
        .polygon_mode(convert::polygon_mode(raster.polygon_mode))
        .cull_mode(convert::cull_mode(raster.cull_mode))
        .front_face(convert::front_face(raster.front_face))
        .depth_clamp_enable(raster.depth_clamp_enable)
        .rasterizer_discard_enable(raster.rasterizer_discard_enable)
        .line_width(raster.line_width.into_inner());
    if let Some(bias) = raster.depth_bias {
        rasterization = rasterization
            .depth_bias_enable(true)
            .depth_bias_constant_factor(bias.constant_factor.into_inner())
            .depth_bias_clamp(bias.clamp.into_inner())
            .depth_bias_slope_factor(bias.slope_factor.into_inner());
    }

    let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
        .rasterization_samples(convert::sample_count(state.multisample.rasterization_samples))
        .sample_shading_enable(state.multisample.sample_shading_enable)
        .min_sample_shading(state.multisample.min_sample_shading.into_inner())
        .alpha_to_coverage_enable(state.multisample.alpha_to_coverage_enable)
        .alpha_to_one_enable(state.multisample.alpha_to_one_enable);

    let ds = &state.depth_stencil;
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
        .depth_test_enable(ds.depth_test_enable)
        .depth_write_enable(ds.depth_write_enable)
        .depth_compare_op(convert::compare_op(ds.depth_compare_op))
        .depth_bounds_test_enable(ds.depth_bounds_test_enable)
        .stencil_test_enable(ds.stencil_test_enable)
        .front(convert::stencil_op_state(&ds.front))
        .back(convert::stencil_op_state(&ds.back));

    let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = state
        .color_blend
        .attachments
        .iter()
        .map(|a| vk::PipelineColorBlendAttachmentState {
            blend_enable: a.blend_enable as u32,
            src_color_blend_factor: convert::blend_factor(a.src_color_blend_factor),
            dst_color_blend_factor: convert::blend_factor(a.dst_color_blend_factor),
            color_blend_op: convert::blend_op(a.color_blend_op),
            src_alpha_blend_factor: convert::blend_factor(a.src_alpha_blend_factor),
            dst_alpha_blend_factor: convert::blend_factor(a.dst_alpha_blend_factor),
            alpha_blend_op: convert::blend_op(a.alpha_blend_op),
            color_write_mask: convert::color_components(a.color_write_mask),
        })
        .collect();
    let blend_constants = [
        state.color_blend.blend_constants[0].into_inner(),
        state.color_blend.blend_constants[1].into_inner(),
        state.color_blend.blend_constants[2].into_inner(),
        state.color_blend.blend_constants[3].into_inner(),
    ];
    let color_blend = vk::PipelineColorBlendStateCreateInfo::builder()
        .attachments(&blend_attachments)
        .blend_constants(blend_constants);

    let dynamic_states: Vec<vk::DynamicState> = state
        .dynamic_states
        .iter()
        .map(|d| match d {
            DynamicState::Viewport => vk::DynamicState::VIEWPORT,
            DynamicState::Scissor => vk::DynamicState::SCISSOR,
            DynamicState::DepthBias => vk::DynamicState::DEPTH_BIAS,
            DynamicState::LineWidth => vk::DynamicState::LINE_WIDTH,
            DynamicState::BlendConstants => vk::DynamicState::BLEND_CONSTANTS,
        })
        .collect();
    let dynamic = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

    let info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blend)
        .dynamic_state(&dynamic)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(spec.subpass)
        .build();

    let pipelines = unsafe {
        device
            .device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
            .map_err(|(_, err)| {
                DeviceError::PipelineCreationFailed(format!("{:?}", err))
            })?
    };
    Ok(VkPipeline {
        raw: pipelines[0],
        layout,
        bind_point: vk::PipelineBindPoint::GRAPHICS,
    })
}

pub(crate) fn create_compute_pipeline(
    device: &VulkanDevice,
    spec: &ComputePipelineSpec,
) -> DeviceResult<VkPipeline> {
    let (layout, _) = get_or_create_pipeline_layout(device, spec.shader)?;
    let specialization = build_specialization(&spec.specialization);
    let spec_info = vk::SpecializationInfo::builder()
        .map_entries(&specialization.entries)
        .data(&specialization.data)
        .build();

    let stage = device
        .shaders
        .with(spec.shader.raw(), |s| {
            s.modules
                .iter()
                .find(|m| m.stage == ember_render::ShaderStage::Compute)
                .map(|m| {
                    let mut stage = vk::PipelineShaderStageCreateInfo::builder()
                        .stage(vk::ShaderStageFlags::COMPUTE)
                        .module(m.module)
                        .name(&m.entry_point);
                    if !specialization.entries.is_empty() {
                        stage = stage.specialization_info(&spec_info);
                    }
                    stage.build()
                })
        })
        .ok_or(DeviceError::HandleInvalid(spec.shader.raw()))?
        .ok_or_else(|| DeviceError::InvalidSpec("shader group has no compute stage".into()))?;

    let info = vk::ComputePipelineCreateInfo::builder()
        .stage(stage)
        .layout(layout)
        .build();
    let pipelines = unsafe {
        device
            .device
            .create_compute_pipelines(vk::PipelineCache::null(), &[info], None)
            .map_err(|(_, err)| DeviceError::PipelineCreationFailed(format!("{:?}", err)))?
    };
    Ok(VkPipeline {
        raw: pipelines[0],
        layout,
        bind_point: vk::PipelineBindPoint::COMPUTE,
    })
}

fn create_descriptor_pool(device: &VulkanDevice) -> DeviceResult<vk::DescriptorPool> {
    let sizes = [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 4 * DESCRIPTOR_POOL_SET_COUNT,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::SAMPLED_IMAGE,
            descriptor_count: 2 * DESCRIPTOR_POOL_SET_COUNT,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::STORAGE_IMAGE,
            descriptor_count: DESCRIPTOR_POOL_SET_COUNT,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 2 * DESCRIPTOR_POOL_SET_COUNT,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::STORAGE_BUFFER,
            descriptor_count: 2 * DESCRIPTOR_POOL_SET_COUNT,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::INPUT_ATTACHMENT,
            descriptor_count: DESCRIPTOR_POOL_SET_COUNT,
        },
    ];
    let info = vk::DescriptorPoolCreateInfo::builder()
        .max_sets(DESCRIPTOR_POOL_SET_COUNT)
        .pool_sizes(&sizes);
    unsafe {
        device
            .device
            .create_descriptor_pool(&info, None)
            .map_err(map_vk_error)
    }
}

pub(crate) fn allocate_descriptor_set(
    device: &VulkanDevice,
    layout_spec: &DescriptorSetLayoutSpec,
) -> DeviceResult<vk::DescriptorSet> {
    let layout = get_or_create_set_layout(device, layout_spec)?;
    let mut chain = device.descriptor_pools.lock();
    if chain.pools.is_empty() {
        let pool = create_descriptor_pool(device)?;
        chain.pools.push(pool);
    }
    let layouts = [layout];
    for attempt in 0..2 {
        let pool = match chain.pools.last() {
            Some(&pool) => pool,
            None => return Err(DeviceError::DescriptorPoolExhausted),
        };
        let info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        match unsafe { device.device.allocate_descriptor_sets(&info) } {
            Ok(sets) => return Ok(sets[0]),
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL)
                if attempt == 0 =>
            {
                // chain another pool and retry once
                let pool = create_descriptor_pool(device)?;
                chain.pools.push(pool);
            }
            Err(err) => return Err(map_vk_error(err)),
        }
    }
    Err(DeviceError::DescriptorPoolExhausted)
}

pub(crate) fn update_descriptor_set(
    device: &VulkanDevice,
    set: DescriptorSetHandle,
    writes: &[DescriptorWrite],
) {
    let Some(vk_set) = device.descriptor_sets.get(set.raw()) else {
        log::error!("update_descriptor_set: invalid handle {:?}", set);
        return;
    };

    // info arrays must stay alive until the final update call
    let mut image_infos: Vec<Vec<vk::DescriptorImageInfo>> = Vec::new();
    let mut buffer_infos: Vec<Vec<vk::DescriptorBufferInfo>> = Vec::new();
    // (write index, image info index or buffer info index)
    enum InfoRef {
        Image(usize),
        Buffer(usize),
    }
    let mut refs: Vec<(usize, InfoRef)> = Vec::new();

    for (write_index, write) in writes.iter().enumerate() {
        let mut images = Vec::new();
        let mut buffers = Vec::new();
        for resource in &write.resources {
            match *resource {
                DescriptorResource::SamplerWithTexture {
                    sampler,
                    texture,
                    layout,
                } => {
                    let (Some(vk_sampler), Some(view)) = (
                        device.samplers.get(sampler.raw()),
                        device.textures.with(texture.raw(), |t| t.view),
                    ) else {
                        continue;
                    };
                    images.push(vk::DescriptorImageInfo {
                        sampler: vk_sampler,
                        image_view: view,
                        image_layout: convert::texture_layout(layout),
                    });
                }
                DescriptorResource::Texture { texture, layout } => {
                    let Some(view) = device.textures.with(texture.raw(), |t| t.view) else {
                        continue;
                    };
                    images.push(vk::DescriptorImageInfo {
                        sampler: vk::Sampler::null(),
                        image_view: view,
                        image_layout: convert::texture_layout(layout),
                    });
                }
                DescriptorResource::StorageImage { texture } => {
                    let Some(view) = device.textures.with(texture.raw(), |t| t.view) else {
                        continue;
                    };
                    images.push(vk::DescriptorImageInfo {
                        sampler: vk::Sampler::null(),
                        image_view: view,
                        image_layout: vk::ImageLayout::GENERAL,
                    });
                }
                DescriptorResource::Buffer {
                    buffer,
                    offset,
                    range,
                } => {
                    let Some((raw, size)) = device.buffers.with(buffer.raw(), |b| (b.raw, b.size))
                    else {
                        continue;
                    };
                    buffers.push(vk::DescriptorBufferInfo {
                        buffer: raw,
                        offset,
                        range: range.unwrap_or(size - offset),
                    });
                }
                DescriptorResource::Sampler { sampler } => {
                    let Some(vk_sampler) = device.samplers.get(sampler.raw()) else {
                        continue;
                    };
                    images.push(vk::DescriptorImageInfo {
                        sampler: vk_sampler,
                        image_view: vk::ImageView::null(),
                        image_layout: vk::ImageLayout::UNDEFINED,
                    });
                }
            }
        }
        if !images.is_empty() {
            image_infos.push(images);
            refs.push((write_index, InfoRef::Image(image_infos.len() - 1)));
        } else if !buffers.is_empty() {
            buffer_infos.push(buffers);
            refs.push((write_index, InfoRef::Buffer(buffer_infos.len() - 1)));
        }
    }

    let vk_writes: Vec<vk::WriteDescriptorSet> = refs
        .iter()
        .map(|(write_index, info_ref)| {
            let write = &writes[*write_index];
            let mut builder = vk::WriteDescriptorSet::builder()
                .dst_set(vk_set)
                .dst_binding(write.binding)
                .descriptor_type(convert::descriptor_type(write.ty));
            match info_ref {
                InfoRef::Image(i) => builder = builder.image_info(&image_infos[*i]),
                InfoRef::Buffer(i) => builder = builder.buffer_info(&buffer_infos[*i]),
            }
            builder.build()
        })
        .collect();

    if !vk_writes.is_empty() {
        unsafe { device.device.update_descriptor_sets(&vk_writes, &[]) };
    }
}
