//! Node Signatures
//!
//! A [`NodeDecl`] is the typed parameter schema of one node kind: which
//! parameters it takes, how each accesses its resource, and what fixed
//! function role (semantic) the parameter plays. Declarations are registered
//! once on the graph; per-frame [`Cmd`]s reference them by id and supply the
//! actual arguments.
//!
//! Registering a declaration derives its [`NodeRenderPassInfo`]: which
//! parameters bind render-target slots, the depth-stencil target, resolve
//! targets, clear values and viewport / scissor sources. The pre-process
//! phase consumes this metadata to compute per-command render pass state.
//!
//! [`Cmd`]: crate::graph::node::Cmd

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::graph::access::{AccessAttr, AccessFlags};
use crate::graph::resource::MAX_RENDER_TARGETS;

/// Queue class hint of a node declaration.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum QueueClass {
    /// Graphics-capable queue.
    #[default]
    Graphics,
    /// Compute-capable queue.
    Compute,
    /// Copy / transfer queue.
    Copy,
}

/// Graphics resource and argument usage semantics.
///
/// Only the semantics the compiler acts on are modeled; user resource
/// bindings cover everything bound to programmable shader slots.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum Semantic {
    /// No semantics.
    #[default]
    Unspecified,
    /// Usage as a viewport. Data type must be [`Viewport`].
    ///
    /// [`Viewport`]: crate::graph::node::Viewport
    Viewport,
    /// Usage as a scissor rectangle. Data type must be [`Rect`].
    ///
    /// [`Rect`]: crate::graph::node::Rect
    Scissor,
    /// Usage as a color clear value (`[f32; 4]`).
    ColorClearValue,
    /// Usage as a depth clear value (`f32`).
    DepthClearValue,
    /// Usage as a stencil clear value (`u32`, lower 8 bits used).
    StencilClearValue,
    /// Bound as a render target view. The semantic index is the target slot.
    RenderTarget,
    /// Bound as a depth stencil view.
    DepthStencilTarget,
    /// Bound as a resolve target. The semantic index is the render-target
    /// slot of the resolve source.
    ResolveTarget,
    /// User defined resource view binding (SRVs / UAVs bound to shaders).
    UserResourceBinding,
}

bitflags! {
    /// Bitflags for node and graph parameter properties.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
    pub struct ParamFlags: u32 {
        /// Parameter carries resource views.
        const RESOURCE = 1 << 0;
        /// Parameter is an output of the graph (output params extend the
        /// referenced resource's lifetime beyond the graph).
        const OUT = 1 << 1;
    }
}

/// Reference from render-pass metadata to a `(parameter, array element)`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ParamRef {
    /// Parameter index within the node declaration.
    pub param_id: u32,
    /// Element offset for array parameters.
    pub array_offset: u32,
}

/// One parameter slot of a node declaration.
#[derive(Clone, Debug)]
pub struct NodeParamDecl {
    /// Parameter name (diagnostics only).
    pub name: String,
    /// Declared access. `AccessAttr::UNKNOWN` for data parameters that do
    /// not touch resources.
    pub access: AccessAttr,
    /// Fixed-function role of the parameter.
    pub semantic: Semantic,
    /// Base semantic index (e.g. first render-target slot or viewport index).
    pub base_semantic_index: u32,
    /// Array element count; 1 for scalars.
    pub element_count: u32,
    /// Parameter properties.
    pub flags: ParamFlags,
    /// Offset of this parameter's first access record within the node's
    /// flattened access list. Assigned at declaration registration.
    pub(crate) access_offset: u32,
}

impl NodeParamDecl {
    /// Creates a resource parameter.
    #[must_use]
    pub fn resource(name: &str, access: AccessAttr, semantic: Semantic) -> Self {
        Self {
            name: name.to_owned(),
            access,
            semantic,
            base_semantic_index: 0,
            element_count: 1,
            flags: ParamFlags::RESOURCE,
            access_offset: 0,
        }
    }

    /// Creates a non-resource data parameter (clear values, viewports, …).
    #[must_use]
    pub fn data(name: &str, semantic: Semantic) -> Self {
        Self {
            name: name.to_owned(),
            access: AccessAttr::UNKNOWN,
            semantic,
            base_semantic_index: 0,
            element_count: 1,
            flags: ParamFlags::empty(),
            access_offset: 0,
        }
    }

    /// Sets the array element count.
    #[must_use]
    pub fn with_elements(mut self, count: u32) -> Self {
        self.element_count = count.max(1);
        self
    }

    /// Sets the base semantic index.
    #[must_use]
    pub fn with_semantic_index(mut self, index: u32) -> Self {
        self.base_semantic_index = index;
        self
    }

    /// Returns `true` if the parameter carries resource views.
    #[must_use]
    pub fn is_resource(&self) -> bool {
        self.flags.contains(ParamFlags::RESOURCE)
    }

    /// Offset of the parameter's first access record within the node's
    /// flattened access list.
    #[must_use]
    pub fn access_offset(&self) -> u32 {
        self.access_offset
    }
}

/// Render-pass metadata of a node declaration, derived from its parameter
/// semantics at registration time.
#[derive(Clone, Debug, Default)]
pub struct NodeRenderPassInfo {
    /// Bitmask of bound render-target slots.
    pub render_target_mask: u32,
    /// Bitmask of render-target slots that are cleared.
    pub render_target_clear_mask: u32,
    /// Per-slot parameter references (indexed by slot, unbound slots `None`).
    pub render_target_refs: [Option<ParamRef>; MAX_RENDER_TARGETS],
    /// Per-slot color clear-value references.
    pub clear_value_refs: [Option<ParamRef>; MAX_RENDER_TARGETS],
    /// Per-slot resolve-target references.
    pub resolve_target_refs: [Option<ParamRef>; MAX_RENDER_TARGETS],
    /// Depth-stencil target reference.
    pub depth_stencil_ref: Option<ParamRef>,
    /// Depth clear-value reference.
    pub depth_clear_value_ref: Option<ParamRef>,
    /// Stencil clear-value reference.
    pub stencil_clear_value_ref: Option<ParamRef>,
    /// Depth aspect is cleared.
    pub clear_depth: bool,
    /// Stencil aspect is cleared.
    pub clear_stencil: bool,
    /// Viewport parameter references.
    pub viewport_refs: SmallVec<[ParamRef; 2]>,
    /// Scissor parameter references.
    pub scissor_refs: SmallVec<[ParamRef; 2]>,
    /// Node only clears its attachments (dedicated clear commands; no
    /// render-pass decoration is applied).
    pub clear_only: bool,
}

/// Typed parameter schema of one node kind.
#[derive(Clone, Debug)]
pub struct NodeDecl {
    /// Node kind name.
    pub name: String,
    /// Queue class hint.
    pub queue: QueueClass,
    /// Parameter slots.
    pub params: Vec<NodeParamDecl>,
    /// Total number of flattened access records across resource parameters.
    pub num_accesses: u32,
    /// Render-pass metadata, present when any parameter binds an attachment.
    pub render_pass_info: Option<NodeRenderPassInfo>,
}

impl NodeDecl {
    /// Creates a node declaration; parameters are added with
    /// [`Self::with_param`] and the declaration is completed by graph
    /// registration.
    #[must_use]
    pub fn new(name: &str, queue: QueueClass) -> Self {
        Self {
            name: name.to_owned(),
            queue,
            params: Vec::new(),
            num_accesses: 0,
            render_pass_info: None,
        }
    }

    /// Appends a parameter slot.
    #[must_use]
    pub fn with_param(mut self, param: NodeParamDecl) -> Self {
        self.params.push(param);
        self
    }

    /// Marks the declaration as clear-only (attachments use dedicated clear
    /// commands instead of render-pass load ops).
    #[must_use]
    pub fn clear_only(mut self) -> Self {
        let info = self.render_pass_info.get_or_insert_with(Default::default);
        info.clear_only = true;
        self
    }

    /// Returns `true` if the node may run inside a render pass.
    #[must_use]
    pub fn maybe_graphics_node(&self) -> bool {
        matches!(self.queue, QueueClass::Graphics) && self.render_pass_info.is_some()
    }

    /// Assigns access offsets and derives render-pass metadata from the
    /// parameter semantics. Called once when the declaration is registered.
    pub(crate) fn finalize(&mut self) {
        let mut access_offset = 0u32;
        let clear_only = self
            .render_pass_info
            .as_ref()
            .is_some_and(|info| info.clear_only);
        let mut rp_info = NodeRenderPassInfo {
            clear_only,
            ..Default::default()
        };
        let mut has_attachments = false;

        for (param_id, param) in self.params.iter_mut().enumerate() {
            let param_id = param_id as u32;
            param.access_offset = access_offset;
            if param.is_resource() {
                access_offset += param.element_count;
            }

            for element in 0..param.element_count {
                let slot = (param.base_semantic_index + element) as usize;
                let param_ref = ParamRef {
                    param_id,
                    array_offset: element,
                };

                match param.semantic {
                    Semantic::RenderTarget if slot < MAX_RENDER_TARGETS => {
                        rp_info.render_target_mask |= 1 << slot;
                        rp_info.render_target_refs[slot] = Some(param_ref);
                        if param.access.access.contains(AccessFlags::CLEAR) {
                            rp_info.render_target_clear_mask |= 1 << slot;
                        }
                        has_attachments = true;
                    }
                    Semantic::ResolveTarget if slot < MAX_RENDER_TARGETS => {
                        rp_info.resolve_target_refs[slot] = Some(param_ref);
                    }
                    Semantic::DepthStencilTarget => {
                        rp_info.depth_stencil_ref = Some(param_ref);
                        let access = param.access.access;
                        rp_info.clear_depth = access
                            .contains(AccessFlags::CLEAR)
                            && access.intersects(AccessFlags::DEPTH_WRITE);
                        rp_info.clear_stencil = access
                            .contains(AccessFlags::CLEAR)
                            && access.intersects(AccessFlags::STENCIL_WRITE);
                        has_attachments = true;
                    }
                    Semantic::ColorClearValue if slot < MAX_RENDER_TARGETS => {
                        rp_info.clear_value_refs[slot] = Some(param_ref);
                    }
                    Semantic::DepthClearValue => {
                        rp_info.depth_clear_value_ref = Some(param_ref);
                    }
                    Semantic::StencilClearValue => {
                        rp_info.stencil_clear_value_ref = Some(param_ref);
                    }
                    Semantic::Viewport => rp_info.viewport_refs.push(param_ref),
                    Semantic::Scissor => rp_info.scissor_refs.push(param_ref),
                    _ => {}
                }
            }
        }

        self.num_accesses = access_offset;
        self.render_pass_info = has_attachments.then_some(rp_info);
    }
}

/// One graph-level parameter slot.
///
/// Resource parameters occupy the first declaration slots of the resource
/// vector and bind application-owned (external) resources.
#[derive(Clone, Debug)]
pub struct GraphParamDecl {
    /// Parameter name (diagnostics only).
    pub name: String,
    /// Declared access; seeds `prev_final_access` of external resources.
    pub access: AccessAttr,
    /// Parameter properties.
    pub flags: ParamFlags,
    /// Array element count; 1 for scalars.
    pub element_count: u32,
}

impl GraphParamDecl {
    /// Creates an external-resource graph parameter.
    #[must_use]
    pub fn resource(name: &str, access: AccessAttr) -> Self {
        Self {
            name: name.to_owned(),
            access,
            flags: ParamFlags::RESOURCE,
            element_count: 1,
        }
    }

    /// Creates an output-resource graph parameter.
    #[must_use]
    pub fn output_resource(name: &str, access: AccessAttr) -> Self {
        Self {
            name: name.to_owned(),
            access,
            flags: ParamFlags::RESOURCE | ParamFlags::OUT,
            element_count: 1,
        }
    }

    /// Returns `true` if the parameter is an output resource.
    #[must_use]
    pub fn is_output_resource(&self) -> bool {
        self.flags.contains(ParamFlags::RESOURCE | ParamFlags::OUT)
    }
}

/// Graph-level parameter schema.
#[derive(Clone, Debug, Default)]
pub struct GraphSignature {
    /// Parameter declarations.
    pub params: Vec<GraphParamDecl>,
}

impl GraphSignature {
    /// Creates a signature from parameter declarations.
    #[must_use]
    pub fn new(params: Vec<GraphParamDecl>) -> Self {
        Self { params }
    }

    /// Number of resource declaration slots reserved for external parameter
    /// resources (they always occupy the front of the resource vector).
    #[must_use]
    pub fn max_external_resources(&self) -> u32 {
        self.params
            .iter()
            .filter(|p| p.flags.contains(ParamFlags::RESOURCE) && !p.is_output_resource())
            .map(|p| p.element_count)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::access::ShaderStages;

    #[test]
    fn finalize_assigns_access_offsets() {
        let mut decl = NodeDecl::new("draw", QueueClass::Graphics)
            .with_param(NodeParamDecl::resource(
                "rt",
                AccessAttr::no_stages(AccessFlags::RENDER_TARGET),
                Semantic::RenderTarget,
            ))
            .with_param(NodeParamDecl::data("vp", Semantic::Viewport))
            .with_param(
                NodeParamDecl::resource(
                    "textures",
                    AccessAttr::new(AccessFlags::SHADER_RESOURCE, ShaderStages::PS),
                    Semantic::UserResourceBinding,
                )
                .with_elements(3),
            );

        decl.finalize();

        assert_eq!(decl.num_accesses, 4);
        assert_eq!(decl.params[0].access_offset(), 0);
        assert_eq!(decl.params[2].access_offset(), 1);
        assert!(decl.render_pass_info.is_some());
    }

    #[test]
    fn finalize_derives_clear_masks() {
        let mut decl = NodeDecl::new("clear_draw", QueueClass::Graphics)
            .with_param(NodeParamDecl::resource(
                "rt",
                AccessAttr::no_stages(AccessFlags::RENDER_TARGET | AccessFlags::CLEAR),
                Semantic::RenderTarget,
            ))
            .with_param(NodeParamDecl::data("clear_col", Semantic::ColorClearValue))
            .with_param(NodeParamDecl::resource(
                "ds",
                AccessAttr::no_stages(
                    AccessFlags::DEPTH_WRITE | AccessFlags::STENCIL_WRITE | AccessFlags::CLEAR,
                ),
                Semantic::DepthStencilTarget,
            ));

        decl.finalize();

        let info = decl.render_pass_info.as_ref().unwrap();
        assert_eq!(info.render_target_mask, 0b1);
        assert_eq!(info.render_target_clear_mask, 0b1);
        assert!(info.clear_value_refs[0].is_some());
        assert!(info.clear_depth);
        assert!(info.clear_stencil);
    }

    #[test]
    fn external_resource_count_skips_outputs() {
        let sig = GraphSignature::new(vec![
            GraphParamDecl::resource("back_buffer", AccessAttr::UNKNOWN),
            GraphParamDecl::output_resource("result", AccessAttr::UNKNOWN),
        ]);
        assert_eq!(sig.max_external_resources(), 1);
    }
}
