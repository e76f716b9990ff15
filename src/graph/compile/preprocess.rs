//! Pre-Process Phase
//!
//! Reconciles the frame's declarations with the cached resource instances,
//! then flattens every node parameter into [`CmdAccessInfo`] records the
//! later phases consume.
//!
//! Responsibilities, in order:
//!
//! 1. Collect the per-resource union of all declared accesses (including
//!    output-parameter accesses), so resource creation knows every usage.
//! 2. Initialize / reconcile resource instances: deactivate stale slots,
//!    pick up descriptor changes (invalidating the backend object), relocate
//!    and refresh temporal slices, force persistence of temporal and
//!    output-bound resources.
//! 3. Seed external parameter resources: external flag, initial and carried
//!    final access, application-provided runtime handles.
//! 4. Flatten command accesses: temporal-slice resolution, subresource range
//!    derivation, view-capability recreation (mutable format, cubemap,
//!    formatted buffer).
//! 5. Derive per-command render pass info: attachment formats, sample count,
//!    minimum target dimensions, clear values, viewports and scissors.
//! 6. Initialize allocation requirements once the access union is known.

use crate::errors::{GraphError, Result};
use crate::graph::access::{AccessAttr, AccessFlags};
use crate::graph::builder::GraphBuilder;
use crate::graph::compile::{CompileContext, GraphState, RenderGraphPhase};
use crate::graph::format::Format;
use crate::graph::node::{Cmd, CmdAccessInfo, CmdInfo, CmdRenderPassInfo, NodeArg, Rect, Viewport};
use crate::graph::resource::{
    ClearColorValue, ClearInfo, ClearValue, HeapPlacement, RESOURCE_ID_INVALID, ResourceFlags,
    ResourceInstance, SubresourceRange,
};
use crate::graph::signature::{GraphSignature, NodeDecl, ParamFlags};
use crate::graph::view::ResourceViewFlags;
use crate::runtime::backend::{RuntimeBackend, RuntimeResource};
use crate::utils::{FreeListPool, Span};

/// Phase 1: declaration reconciliation and access flattening.
#[derive(Default)]
pub struct PreProcessPhase;

impl RenderGraphPhase for PreProcessPhase {
    fn name(&self) -> &'static str {
        "pre-process"
    }

    fn run(&mut self, ctx: &mut CompileContext<'_>) -> Result<()> {
        let state = &mut *ctx.state;
        let backend = &mut *ctx.backend;
        let builder = ctx.builder;
        let signature = ctx.signature;
        let node_decls = ctx.node_decls;
        let frame_index = ctx.frame_index;

        validate_cmds(builder, node_decls)?;

        let all_accesses = collect_resource_all_accesses(builder, signature, node_decls);

        init_resource_instances(
            state,
            backend,
            builder,
            signature,
            frame_index,
            &all_accesses,
        )?;

        init_param_resources(state, builder, signature, ctx.arg_resources)?;

        init_cmd_access_infos(state, backend, builder, node_decls, frame_index)?;

        // Allocation requirements, now that the access union is final.
        for instance in &mut state.resource_instances {
            if instance.is_active() && !instance.is_external && !instance.is_temporal_parent() {
                instance.alloc_requirement = backend.get_resource_alloc_requirement(instance);
            }
        }

        log::debug!(
            "pre-process: {} resources, {} cmds, {} accesses",
            builder.resource_decls().len(),
            state.cmd_infos.len(),
            state.cmd_accesses.len()
        );

        Ok(())
    }
}

/// Checks every command against its declaration before anything derefs
/// through them.
fn validate_cmds(builder: &GraphBuilder, node_decls: &[NodeDecl]) -> Result<()> {
    for cmd in builder.cmds() {
        let decl = node_decls
            .get(cmd.node_decl_id as usize)
            .ok_or(GraphError::UnknownNode)?;

        if cmd.args.len() != decl.params.len() {
            return Err(GraphError::InvalidArguments(
                "argument count does not match node declaration",
            ));
        }

        for (param, arg) in decl.params.iter().zip(&cmd.args) {
            if param.is_resource() && arg.element_count() != param.element_count {
                return Err(GraphError::TypeMismatch);
            }
        }
    }
    Ok(())
}

/// Union of declared accesses per declaration slot, merged across all nodes,
/// parameters and array elements plus output-parameter accesses. Temporal
/// layers are deliberately not resolved here: the union applies to the
/// parent and all its slices.
fn collect_resource_all_accesses(
    builder: &GraphBuilder,
    signature: &GraphSignature,
    node_decls: &[NodeDecl],
) -> Vec<AccessAttr> {
    let decl_count = builder.resource_decls().len();
    let mut all_accesses = vec![AccessAttr::UNKNOWN; decl_count];

    for cmd in builder.cmds() {
        let decl = &node_decls[cmd.node_decl_id as usize];
        for (param, arg) in decl.params.iter().zip(&cmd.args) {
            if !param.is_resource() || param.access.is_unknown() {
                continue;
            }
            for element in 0..param.element_count {
                if let Some((resource_id, _, _)) = arg.view_binding(element) {
                    if resource_id != RESOURCE_ID_INVALID && (resource_id as usize) < decl_count {
                        all_accesses[resource_id as usize] |= param.access;
                    }
                }
            }
        }
    }

    for (resource_id, access) in builder.output_param_accesses(signature) {
        if (resource_id as usize) < decl_count {
            all_accesses[resource_id as usize] |= access;
        }
    }

    all_accesses
}

/// Releases a single instance's backend object and clears the slot.
fn deactivate_instance(instance: &mut ResourceInstance, backend: &mut dyn RuntimeBackend) {
    debug_assert!(!instance.is_temporal_parent());
    if let Some(handle) = instance.runtime_resource.take() {
        backend.destroy_resource_deferred(instance.desc.ty, handle);
    }
    *instance = ResourceInstance::default();
}

/// Deactivates a slot, including any temporal slices it owns.
fn deactivate_with_children(
    instances: &mut [ResourceInstance],
    index: usize,
    backend: &mut dyn RuntimeBackend,
) {
    if let Some(offset) = instances[index].temporal_layer_offset {
        let layers = instances[index].desc.temporal_layers as usize;
        for slice in &mut instances[offset as usize..offset as usize + layers] {
            deactivate_instance(slice, backend);
        }
        instances[index].temporal_layer_offset = None;
    }
    deactivate_instance(&mut instances[index], backend);
}

/// Drops the backend object after a descriptor or capability change; the
/// next materialization recreates it.
fn invalidate_runtime_resource(instance: &mut ResourceInstance, backend: &mut dyn RuntimeBackend) {
    if instance.is_external {
        return;
    }

    if let Some(handle) = instance.runtime_resource.take() {
        backend.destroy_resource_deferred(instance.desc.ty, handle);
    }

    if !instance.is_pending_create {
        instance.alloc_placement = HeapPlacement::UNPLACED;
        // Temporal parents own no backend object of their own.
        instance.is_pending_create = !instance.is_temporal_parent();
        instance.prev_final_access = AccessAttr::UNKNOWN;
    }
}

fn init_resource_instances(
    state: &mut GraphState,
    backend: &mut dyn RuntimeBackend,
    builder: &GraphBuilder,
    signature: &GraphSignature,
    frame_index: u64,
    all_accesses: &[AccessAttr],
) -> Result<()> {
    let decl_count = builder.resource_decls().len();
    let num_external = signature.max_external_resources() as usize;
    let instances = &mut state.resource_instances;

    if instances.len() < decl_count {
        instances.resize_with(decl_count, ResourceInstance::default);
    }

    // Deactivate instances beyond the current declaration range. Temporal
    // slices in that range are skipped; they go away with their parent.
    for index in decl_count..instances.len() {
        if !instances[index].is_temporal_slice && instances[index].is_active() {
            deactivate_with_children(instances, index, backend);
        }
    }

    for index in 0..decl_count {
        let Some(new_desc) = builder.resource_decls()[index].desc else {
            deactivate_with_children(instances, index, backend);
            continue;
        };

        // Temporal slices previously parked in this slot range must make way
        // for newly declared resources: relocate them to the end.
        if let Some(offset) = instances[index].temporal_layer_offset {
            if (offset as usize) < decl_count {
                let layers = instances[index].desc.temporal_layers as usize;
                let new_offset = instances.len().max(decl_count);
                instances.resize_with(new_offset + layers, ResourceInstance::default);
                for slice_index in 0..layers {
                    instances.swap(offset as usize + slice_index, new_offset + slice_index);
                }
                instances[index].temporal_layer_offset = Some(new_offset as u32);
            }
        }

        let is_param_resource = index < num_external;
        let instance = &mut instances[index];

        if !instance.is_active() {
            instance.resource_decl_id = index as u32;
        }

        // Reconcile the descriptor, preserving capability flags acquired in
        // earlier frames (cubemap compatibility survives redeclaration).
        let mut merged_desc = new_desc;
        merged_desc.flags |= instance.desc.flags;
        let mut changed = instance.desc != merged_desc;
        instance.desc = merged_desc;

        let merged_accesses = instance.all_accesses | all_accesses[index];
        if instance.all_accesses != merged_accesses {
            instance.all_accesses = merged_accesses;
            changed = true;
        }

        if changed && !is_param_resource {
            invalidate_runtime_resource(instance, backend);
        }

        instance.full_range = instance.desc.full_subresource_range();
        instance.num_subresources = instance.full_range.subresource_count();
        instance.is_accessed = false;
        instance.is_aliased = false;
        instance.initial_access = AccessAttr::UNKNOWN;
        instance.final_accesses = Span::EMPTY;

        if !instance.is_external
            && !instance.is_temporal_parent()
            && instance.runtime_resource.is_none()
        {
            instance.is_pending_create = true;
        }

        if instance.desc.temporal_layers > 1 {
            // Temporal resources are implicitly persistent.
            instance.desc.flags |= ResourceFlags::PERSISTENT;
            init_temporal_slices(instances, backend, frame_index, index, is_param_resource);
        }
    }

    // Output-bound resources outlive the graph.
    for resource_id in builder.all_output_param_resources() {
        if let Some(instance) = instances.get_mut(resource_id as usize) {
            instance.desc.flags |= ResourceFlags::PERSISTENT;
        }
    }

    Ok(())
}

/// Certain properties may drift between temporal slices (only the slice of
/// the current frame is refreshed), so each slice is compared against its
/// parent on its turn.
fn should_recreate_temporal_slice(slice: &ResourceInstance, parent: &ResourceInstance) -> bool {
    slice.runtime_resource.is_none()
        || slice.all_accesses != parent.all_accesses
        || slice.desc != parent.desc
}

fn init_temporal_slices(
    instances: &mut Vec<ResourceInstance>,
    backend: &mut dyn RuntimeBackend,
    frame_index: u64,
    parent_index: usize,
    is_param_resource: bool,
) {
    let layers = instances[parent_index].desc.temporal_layers as usize;

    if let Some(offset) = instances[parent_index].temporal_layer_offset {
        let offset = offset as usize;
        debug_assert!(offset + layers <= instances.len());

        // Refresh only the slice the current frame lands on.
        let current = offset + (frame_index % layers as u64) as usize;
        let parent = instances[parent_index].clone();
        let slice = &mut instances[current];

        debug_assert_eq!(slice.resource_decl_id, parent.resource_decl_id);
        debug_assert!(slice.is_temporal_slice);

        if should_recreate_temporal_slice(slice, &parent) {
            slice.desc = parent.desc;
            slice.full_range = parent.full_range;
            slice.num_subresources = parent.num_subresources;
            slice.all_accesses = parent.all_accesses;
            if !slice.is_external {
                invalidate_runtime_resource(slice, backend);
            }
        }

        slice.initial_access = AccessAttr::UNKNOWN;
        slice.final_accesses = Span::EMPTY;

        for slice in &mut instances[offset..offset + layers] {
            slice.is_accessed = false;
        }
    } else {
        // First sight of this temporal resource: allocate the slice array at
        // the end of the instance vector.
        let offset = instances.len();

        instances[parent_index].is_pending_create = false;

        let mut template = instances[parent_index].clone();
        template.is_temporal_slice = true;
        template.is_accessed = false;
        template.temporal_layer_offset = None;
        if !is_param_resource {
            template.runtime_resource = None;
            template.is_pending_create = true;
            template.prev_final_access = AccessAttr::UNKNOWN;
        }

        for layer in 0..layers {
            let mut slice = template.clone();
            slice.is_first_temporal_slice = layer == 0;
            instances.push(slice);
        }

        instances[parent_index].temporal_layer_offset = Some(offset as u32);
    }
}

fn init_param_resources(
    state: &mut GraphState,
    builder: &GraphBuilder,
    signature: &GraphSignature,
    arg_resources: &[&[RuntimeResource]],
) -> Result<()> {
    let instances = &mut state.resource_instances;
    let mut slot = 0usize;
    let mut external_ordinal = 0usize;

    for (param_id, param) in signature.params.iter().enumerate() {
        if !param.flags.contains(ParamFlags::RESOURCE) {
            continue;
        }

        if param.is_output_resource() {
            // Output params seed the bound source resources' initial access.
            for &resource_id in builder.output_param_resources(param_id as u32) {
                if resource_id == RESOURCE_ID_INVALID {
                    continue;
                }
                let source = instances.get_mut(resource_id as usize).ok_or(
                    GraphError::IndexOutOfBounds {
                        context: "output parameter resource",
                        index: resource_id as usize,
                    },
                )?;
                if source.is_temporal_parent() {
                    // Temporal output resources need slice translation across
                    // graph boundaries, which is not supported.
                    return Err(GraphError::NotImplemented);
                }
                source.initial_access = param.access;
            }
            continue;
        }

        for _element in 0..param.element_count {
            let handles = arg_resources.get(external_ordinal).copied().unwrap_or(&[]);
            let instance = &mut instances[slot];

            instance.is_external = true;
            instance.is_pending_create = false;
            instance.initial_access = param.access;
            instance.prev_final_access = param.access;

            if instance.desc.temporal_layers <= 1 {
                if let Some(&handle) = handles.first() {
                    instance.runtime_resource = Some(handle);
                }
            } else if let Some(offset) = instance.temporal_layer_offset {
                let layers = instance.desc.temporal_layers as usize;
                let initial_access = instance.initial_access;
                for layer in 0..layers {
                    let slice = &mut instances[offset as usize + layer];
                    slice.is_external = true;
                    slice.is_pending_create = false;
                    slice.initial_access = initial_access;
                    if let Some(&handle) = handles.get(layer) {
                        slice.prev_final_access = initial_access;
                        slice.runtime_resource = Some(handle);
                    }
                }
            }

            slot += 1;
            external_ordinal += 1;
        }
    }

    Ok(())
}

/// Resolves the instance a view addresses, translating temporal layers:
/// the slice for frame `F` at offset `k` is
/// `parent_offset + ((F - min(k, F)) % T)`.
fn resolve_temporal_slice(
    instances: &[ResourceInstance],
    resource_id: u32,
    temporal_layer: u32,
    frame_index: u64,
) -> u32 {
    let parent = &instances[resource_id as usize];
    if parent.desc.temporal_layers > 1 {
        if let Some(offset) = parent.temporal_layer_offset {
            let layers = u64::from(parent.desc.temporal_layers);
            let layer = u64::from(temporal_layer).min(frame_index);
            return offset + ((frame_index - layer) % layers) as u32;
        }
    }
    resource_id
}

/// Derives the subresource range an image access addresses: the view's range
/// intersected with the resource's, with aspects projected from the access
/// (a depth-only access of a depth-stencil image addresses only the depth
/// plane).
fn image_access_range(
    instance: &ResourceInstance,
    access: &AccessAttr,
    view_range: &SubresourceRange,
    view_format: Format,
) -> SubresourceRange {
    let resource_aspects = instance.full_range.aspect_mask;

    let depth_bits = AccessFlags::DEPTH_READ | AccessFlags::DEPTH_WRITE;
    let stencil_bits = AccessFlags::STENCIL_READ | AccessFlags::STENCIL_WRITE;

    let accessed_aspects = if access.access.intersects(depth_bits)
        && !access.access.intersects(stencil_bits)
    {
        0b01
    } else if access.access.intersects(stencil_bits) && !access.access.intersects(depth_bits) {
        0b10
    } else if view_format != Format::Unknown {
        view_format.aspect_mask()
    } else {
        resource_aspects
    };

    let mut range = *view_range;
    range.aspect_mask = accessed_aspects & resource_aspects;

    range
        .intersect(&instance.full_range)
        .unwrap_or(SubresourceRange {
            aspect_mask: accessed_aspects & resource_aspects,
            ..instance.full_range
        })
}

fn init_cmd_access_infos(
    state: &mut GraphState,
    backend: &mut dyn RuntimeBackend,
    builder: &GraphBuilder,
    node_decls: &[NodeDecl],
    frame_index: u64,
) -> Result<()> {
    let decl_count = builder.resource_decls().len();

    for (cmd_index, cmd) in builder.cmds().iter().enumerate() {
        let decl = &node_decls[cmd.node_decl_id as usize];

        let accesses_span = if decl.num_accesses == 0 {
            Span::EMPTY
        } else {
            state
                .cmd_accesses
                .grow(decl.num_accesses as usize, CmdAccessInfo::INVALID)
        };

        for (param, arg) in decl.params.iter().zip(&cmd.args) {
            if !param.is_resource() || param.access.is_unknown() {
                continue;
            }

            for element in 0..param.element_count {
                let Some((resource_id, view_format, temporal_layer)) = arg.view_binding(element)
                else {
                    continue;
                };
                if resource_id == RESOURCE_ID_INVALID {
                    continue;
                }
                if resource_id as usize >= decl_count {
                    return Err(GraphError::InvalidProgram);
                }

                let resolved_id = resolve_temporal_slice(
                    &state.resource_instances,
                    resource_id,
                    temporal_layer,
                    frame_index,
                );

                let instance = &mut state.resource_instances[resolved_id as usize];
                debug_assert!(!instance.is_temporal_parent());
                instance.is_accessed = true;

                let mut pending_recreate = false;
                let range;

                if instance.desc.is_image() {
                    let image_view = arg
                        .as_image_views()
                        .and_then(|views| views.get(element as usize))
                        .ok_or(GraphError::TypeMismatch)?;

                    range = image_access_range(
                        instance,
                        &param.access,
                        &image_view.subresource_range,
                        view_format,
                    );

                    if view_format != Format::Unknown && view_format != instance.desc.image.format
                    {
                        pending_recreate |= !instance.is_mutable_format;
                        instance.is_mutable_format = true;
                    }

                    if image_view.flags.contains(ResourceViewFlags::CUBEMAP) {
                        pending_recreate |= !instance
                            .desc
                            .flags
                            .contains(ResourceFlags::CUBEMAP_COMPATIBLE);
                        instance.desc.flags |= ResourceFlags::CUBEMAP_COMPATIBLE;
                    }
                } else if instance.desc.is_buffer() {
                    range = SubresourceRange::whole_buffer();

                    if view_format != Format::Unknown {
                        if param.access.access.intersects(AccessFlags::ALL_GPU_WRITE) {
                            pending_recreate |= !instance.buffer_formatted_write;
                            instance.buffer_formatted_write = true;
                        } else {
                            pending_recreate |= !instance.buffer_formatted_read;
                            instance.buffer_formatted_read = true;
                        }
                    }
                } else {
                    return Err(GraphError::InvalidData);
                }

                let resolved_format = if view_format == Format::Unknown && instance.desc.is_image()
                {
                    instance.desc.image.format
                } else {
                    view_format
                };

                if pending_recreate {
                    invalidate_runtime_resource(instance, backend);
                }

                let record_index = accesses_span.begin() + param.access_offset() + element;
                state.cmd_accesses[record_index] = CmdAccessInfo {
                    resource_id: resolved_id,
                    range,
                    access: param.access,
                    view_format: resolved_format,
                };
            }
        }

        let render_pass_info = if decl.render_pass_info.is_some() {
            Some(derive_render_pass_info(state, cmd, decl, accesses_span)?)
        } else {
            None
        };

        state.cmd_infos.push(CmdInfo {
            node_decl_id: cmd.node_decl_id,
            accesses: accesses_span,
            render_pass_info,
        });

        debug_assert_eq!(state.cmd_infos.len() - 1, cmd_index);
    }

    Ok(())
}

fn set_resource_clear_value(
    clear_values: &mut FreeListPool<ClearInfo>,
    instance: &mut ResourceInstance,
    clear_info: ClearInfo,
) {
    let slot = match instance.clear_value_id {
        Some(slot) => slot,
        None => {
            let slot = clear_values.alloc_slot();
            instance.clear_value_id = Some(slot);
            slot
        }
    };
    if let Some(value) = clear_values.get_mut(slot) {
        *value = clear_info;
    }
}

/// Attachment dimension bookkeeping shared by color and depth targets.
fn update_target_dim(
    instance: &ResourceInstance,
    access: &CmdAccessInfo,
    min_dim: &mut [u32; 2],
    num_samples: &mut u32,
) -> Result<()> {
    if instance.desc.is_image() {
        let mip = access.range.base_mip;
        let mip_width = (instance.desc.image.width >> mip).max(1);
        let mip_height = (instance.desc.image.height >> mip).max(1);
        min_dim[0] = min_dim[0].min(mip_width);
        min_dim[1] = min_dim[1].min(mip_height);
        *num_samples = (*num_samples).max(instance.desc.sample_count());
    } else if instance.desc.is_buffer() {
        let element_size = u64::from(access.view_format.element_bytes());
        if element_size == 0 {
            return Err(GraphError::InvalidArguments(
                "formatted buffer render target requires a sized view format",
            ));
        }
        let num_elements = instance.desc.buffer_size / element_size;
        if num_elements > u64::from(u32::MAX) {
            return Err(GraphError::IntegerOverflow);
        }
        min_dim[0] = min_dim[0].min(num_elements as u32);
        min_dim[1] = min_dim[1].min(1);
    }
    Ok(())
}

fn derive_render_pass_info(
    state: &mut GraphState,
    cmd: &Cmd,
    decl: &NodeDecl,
    accesses_span: Span,
) -> Result<CmdRenderPassInfo> {
    let rp_decl = decl.render_pass_info.as_ref().expect("checked by caller");
    let mut info = CmdRenderPassInfo::default();

    let mut num_samples = 1u32;
    let mut min_dim = [u32::MAX; 2];

    // Color attachments.
    for (slot, target_ref) in rp_decl.render_target_refs.iter().enumerate() {
        let Some(target_ref) = target_ref else {
            continue;
        };
        let access_index = accesses_span.begin()
            + decl.params[target_ref.param_id as usize].access_offset()
            + target_ref.array_offset;
        let access = state.cmd_accesses[access_index];
        if access.resource_id == RESOURCE_ID_INVALID {
            continue;
        }

        debug_assert!(access.access.access.contains(AccessFlags::RENDER_TARGET));

        if !rp_decl.clear_only {
            state.cmd_accesses[access_index].access.access |= AccessFlags::RENDER_PASS;
        }

        info.render_target_info.num_render_targets = slot as u32 + 1;
        info.render_target_info.render_target_formats[slot] = access.view_format;

        update_target_dim(
            &state.resource_instances[access.resource_id as usize],
            &access,
            &mut min_dim,
            &mut num_samples,
        )?;

        if rp_decl.render_target_clear_mask & (1 << slot) != 0 {
            state.cmd_accesses[access_index].access.access |= AccessFlags::CLEAR;

            if let Some(clear_ref) = rp_decl.clear_value_refs[slot] {
                if let Some(NodeArg::ClearColor(color)) = cmd.args.get(clear_ref.param_id as usize)
                {
                    let clear_info = ClearInfo {
                        format: access.view_format,
                        value: ClearValue {
                            color: ClearColorValue::Float(*color),
                            ..ClearValue::default()
                        },
                    };
                    set_resource_clear_value(
                        &mut state.clear_values,
                        &mut state.resource_instances[access.resource_id as usize],
                        clear_info,
                    );
                }
            }
        }
    }

    // Depth-stencil attachment.
    if let Some(ds_ref) = rp_decl.depth_stencil_ref {
        let access_index = accesses_span.begin()
            + decl.params[ds_ref.param_id as usize].access_offset()
            + ds_ref.array_offset;
        let access = state.cmd_accesses[access_index];

        if access.resource_id != RESOURCE_ID_INVALID {
            info.render_target_info.depth_stencil_format = access.view_format;

            update_target_dim(
                &state.resource_instances[access.resource_id as usize],
                &access,
                &mut min_dim,
                &mut num_samples,
            )?;

            if !rp_decl.clear_only {
                state.cmd_accesses[access_index].access.access |= AccessFlags::RENDER_PASS;
            }

            if rp_decl.clear_depth || rp_decl.clear_stencil {
                let mut clear_info = ClearInfo {
                    format: access.view_format,
                    value: ClearValue::default(),
                };

                if rp_decl.clear_depth {
                    if let Some(depth_ref) = rp_decl.depth_clear_value_ref {
                        if let Some(NodeArg::ClearDepth(depth)) =
                            cmd.args.get(depth_ref.param_id as usize)
                        {
                            clear_info.value.depth = *depth;
                        }
                    }
                    state.cmd_accesses[access_index].access.access |= AccessFlags::CLEAR;
                }

                if rp_decl.clear_stencil {
                    if let Some(stencil_ref) = rp_decl.stencil_clear_value_ref {
                        if let Some(NodeArg::ClearStencil(stencil)) =
                            cmd.args.get(stencil_ref.param_id as usize)
                        {
                            clear_info.value.stencil = *stencil;
                        }
                    }
                    state.cmd_accesses[access_index].access.access |= AccessFlags::CLEAR;
                }

                set_resource_clear_value(
                    &mut state.clear_values,
                    &mut state.resource_instances[access.resource_id as usize],
                    clear_info,
                );
            }
        }
    }

    let min_width = if min_dim[0] == u32::MAX { 0 } else { min_dim[0] };
    let min_height = if min_dim[1] == u32::MAX { 0 } else { min_dim[1] };

    // Viewports: honor declared parameters, otherwise synthesize one covering
    // the smallest attachment.
    if rp_decl.viewport_refs.is_empty() {
        info.viewport_info
            .viewports
            .push(Viewport::covering(min_width as f32, min_height as f32));
    } else {
        let mut count = 0usize;
        for viewport_ref in &rp_decl.viewport_refs {
            let param = &decl.params[viewport_ref.param_id as usize];
            count = count.max((param.base_semantic_index + viewport_ref.array_offset) as usize + 1);
        }
        info.viewport_info
            .viewports
            .resize(count, Viewport::default());
        for viewport_ref in &rp_decl.viewport_refs {
            let param = &decl.params[viewport_ref.param_id as usize];
            let index = (param.base_semantic_index + viewport_ref.array_offset) as usize;
            if let Some(viewports) = cmd
                .args
                .get(viewport_ref.param_id as usize)
                .and_then(NodeArg::as_viewports)
            {
                if let Some(&viewport) = viewports.get(viewport_ref.array_offset as usize) {
                    info.viewport_info.viewports[index] = viewport;
                }
            }
        }
    }

    // Scissors likewise.
    if rp_decl.scissor_refs.is_empty() {
        info.viewport_info
            .scissors
            .push(Rect::covering(min_width as i32, min_height as i32));
    } else {
        let mut count = 0usize;
        for scissor_ref in &rp_decl.scissor_refs {
            let param = &decl.params[scissor_ref.param_id as usize];
            count = count.max((param.base_semantic_index + scissor_ref.array_offset) as usize + 1);
        }
        info.viewport_info.scissors.resize(count, Rect::default());
        for scissor_ref in &rp_decl.scissor_refs {
            let param = &decl.params[scissor_ref.param_id as usize];
            let index = (param.base_semantic_index + scissor_ref.array_offset) as usize;
            if let Some(scissors) = cmd
                .args
                .get(scissor_ref.param_id as usize)
                .and_then(NodeArg::as_scissors)
            {
                if let Some(&rect) = scissors.get(scissor_ref.array_offset as usize) {
                    info.viewport_info.scissors[index] = rect;
                }
            }
        }
    }

    info.viewport_info.default_render_area = Rect::covering(min_width as i32, min_height as i32);
    info.render_target_info.num_samples = num_samples;

    Ok(info)
}
