//! Graph Builder
//!
//! Per-frame declaration interface. The application's build callback runs
//! once per [`update`] and re-declares the frame: resources, nodes with their
//! arguments, explicit dependencies and subgraph constraints. Declaration
//! slots are positional — declaring the same frame shape twice yields the
//! same resource and node ids, which is what lets the pre-process phase
//! reconcile this frame's declarations with the cached instances of the
//! previous one.
//!
//! [`update`]: crate::graph::RenderGraph::update

use crate::errors::{GraphError, Result};
use crate::graph::access::AccessAttr;
use crate::graph::dag::{DependencyGraph, SubgraphFlags};
use crate::graph::node::{CallbackFlags, Cmd, CmdCallback, NodeArg, NodeId};
use crate::graph::resource::{RESOURCE_ID_INVALID, ResourceDesc, ResourceId};
use crate::graph::signature::{GraphSignature, ParamFlags};

/// One resource declaration slot of the current frame.
#[derive(Clone, Debug)]
pub struct ResourceDecl {
    /// Resource name (diagnostics, debug markers).
    pub name: String,
    /// Descriptor; `None` marks an abandoned slot.
    pub desc: Option<ResourceDesc>,
}

/// Collects one frame's declarations.
///
/// Obtained inside the build callback passed to [`update`]; all ids it hands
/// out are dense indices valid for the frame being built.
///
/// [`update`]: crate::graph::RenderGraph::update
pub struct GraphBuilder {
    resource_decls: Vec<ResourceDecl>,
    cmds: Vec<Cmd>,
    dag: DependencyGraph,
    subgraph_stack: Vec<(u32, SubgraphFlags)>,
    next_subgraph_id: u32,
    output_param_resources: Vec<Vec<ResourceId>>,
    build_error: Option<GraphError>,
}

impl GraphBuilder {
    pub(crate) fn new() -> Self {
        Self {
            resource_decls: Vec::new(),
            cmds: Vec::new(),
            dag: DependencyGraph::new(),
            subgraph_stack: Vec::new(),
            next_subgraph_id: 0,
            output_param_resources: Vec::new(),
            build_error: None,
        }
    }

    /// Resets the builder for a new frame and pre-declares one slot per
    /// external resource parameter of the signature (they always occupy the
    /// front of the declaration vector).
    pub(crate) fn begin(&mut self, signature: &GraphSignature) {
        self.resource_decls.clear();
        self.cmds.clear();
        self.dag.reset();
        self.subgraph_stack.clear();
        self.next_subgraph_id = 0;
        self.output_param_resources.clear();
        self.output_param_resources
            .resize(signature.params.len(), Vec::new());
        self.build_error = None;

        for param in &signature.params {
            if param.flags.contains(ParamFlags::RESOURCE) && !param.is_output_resource() {
                for element in 0..param.element_count {
                    let name = if param.element_count == 1 {
                        param.name.clone()
                    } else {
                        format!("{}[{element}]", param.name)
                    };
                    // External resources: the descriptor is reconciled from
                    // the application side via declare_external below.
                    self.resource_decls.push(ResourceDecl { name, desc: None });
                }
            }
        }
    }

    /// Finishes the frame, surfacing any recorded build error.
    pub(crate) fn end(&mut self) -> Result<()> {
        if !self.subgraph_stack.is_empty() {
            return Err(GraphError::InvalidProgram);
        }
        match self.build_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // ── Resources ──────────────────────────────────────────────────────────

    /// Declares a transient or persistent resource for this frame.
    pub fn declare_resource(&mut self, name: &str, mut desc: ResourceDesc) -> ResourceId {
        desc.canonicalize_mips();
        let id = self.resource_decls.len() as ResourceId;
        self.resource_decls.push(ResourceDecl {
            name: name.to_owned(),
            desc: Some(desc),
        });
        id
    }

    /// Supplies the descriptor of an external resource parameter slot.
    ///
    /// `slot` indexes the signature's external resources in declaration
    /// order; the runtime handles come in through
    /// [`UpdateInfo::arg_resources`].
    ///
    /// [`UpdateInfo::arg_resources`]: crate::graph::UpdateInfo
    pub fn declare_external(&mut self, slot: u32, mut desc: ResourceDesc) -> Result<ResourceId> {
        let decl = self.resource_decls.get_mut(slot as usize).ok_or(
            GraphError::IndexOutOfBounds {
                context: "external resource slot",
                index: slot as usize,
            },
        )?;
        desc.canonicalize_mips();
        decl.desc = Some(desc);
        Ok(slot)
    }

    /// Binds resources to an output graph parameter; their lifetime then
    /// extends beyond the graph.
    pub fn bind_output_param(&mut self, param_id: u32, resources: &[ResourceId]) -> Result<()> {
        let slot = self.output_param_resources.get_mut(param_id as usize).ok_or(
            GraphError::IndexOutOfBounds {
                context: "output parameter",
                index: param_id as usize,
            },
        )?;
        slot.clear();
        slot.extend_from_slice(resources);
        Ok(())
    }

    // ── Nodes ──────────────────────────────────────────────────────────────

    /// Adds a node instantiating a registered declaration.
    ///
    /// `args` must supply one entry per declared parameter; resource
    /// parameters must carry view arguments of matching element count.
    /// Violations surface from the next `update` (`unknown-node`,
    /// `invalid-arguments`, `type-mismatch`).
    pub fn add_node(
        &mut self,
        node_decl_id: u32,
        args: Vec<NodeArg>,
        callback: Option<CmdCallback>,
        user_tag: u64,
    ) -> NodeId {
        let (subgraph_id, subgraph_flags) = self
            .subgraph_stack
            .last()
            .map_or((None, SubgraphFlags::empty()), |&(id, flags)| {
                (Some(id), flags)
            });

        let node_id = self.dag.add_node(subgraph_flags, subgraph_id);
        debug_assert_eq!(node_id as usize, self.cmds.len());

        self.cmds.push(Cmd {
            node_decl_id,
            args,
            callback,
            callback_flags: CallbackFlags::empty(),
            user_tag,
        });

        node_id
    }

    /// Sets callback behavior flags on a previously added node.
    pub fn set_callback_flags(&mut self, node: NodeId, flags: CallbackFlags) -> Result<()> {
        let cmd = self
            .cmds
            .get_mut(node as usize)
            .ok_or(GraphError::IndexOutOfBounds {
                context: "node id",
                index: node as usize,
            })?;
        cmd.callback_flags = flags;
        Ok(())
    }

    /// Adds an explicit dependency: `from` executes before `to`.
    pub fn add_dependency(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        self.dag.add_edge(from, to)
    }

    // ── Subgraphs ──────────────────────────────────────────────────────────

    /// Opens a subgraph; nodes added until [`Self::end_subgraph`] inherit its
    /// scheduling constraints.
    pub fn begin_subgraph(&mut self, flags: SubgraphFlags) {
        let id = self.next_subgraph_id;
        self.next_subgraph_id += 1;
        self.subgraph_stack.push((id, flags));
    }

    /// Closes the innermost subgraph.
    pub fn end_subgraph(&mut self) -> Result<()> {
        self.subgraph_stack
            .pop()
            .map(|_| ())
            .ok_or(GraphError::InvalidProgram)
    }

    /// Records a build error; `end` surfaces the first one.
    pub fn set_build_error(&mut self, error: GraphError) {
        if self.build_error.is_none() {
            self.build_error = Some(error);
        }
    }

    // ── Access for compilation ────────────────────────────────────────────

    /// The frame's resource declarations.
    #[must_use]
    pub fn resource_decls(&self) -> &[ResourceDecl] {
        &self.resource_decls
    }

    /// The frame's node list.
    #[must_use]
    pub fn cmds(&self) -> &[Cmd] {
        &self.cmds
    }

    /// The dependency graph over the frame's nodes.
    #[must_use]
    pub(crate) fn dag(&self) -> &DependencyGraph {
        &self.dag
    }

    /// Resources bound to the given output parameter.
    #[must_use]
    pub fn output_param_resources(&self, param_id: u32) -> &[ResourceId] {
        self.output_param_resources
            .get(param_id as usize)
            .map_or(&[], Vec::as_slice)
    }

    /// Resources bound to any output parameter, flattened.
    pub fn all_output_param_resources(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.output_param_resources
            .iter()
            .flatten()
            .copied()
            .filter(|&id| id != RESOURCE_ID_INVALID)
    }

    /// Declared accesses of output parameters, per bound resource.
    pub(crate) fn output_param_accesses<'a>(
        &'a self,
        signature: &'a GraphSignature,
    ) -> impl Iterator<Item = (ResourceId, AccessAttr)> + 'a {
        signature
            .params
            .iter()
            .enumerate()
            .filter(|(_, param)| param.is_output_resource())
            .flat_map(|(param_id, param)| {
                self.output_param_resources(param_id as u32)
                    .iter()
                    .filter(|&&id| id != RESOURCE_ID_INVALID)
                    .map(move |&id| (id, param.access))
            })
    }
}
