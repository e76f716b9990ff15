//! Render Graph Tests
//!
//! Tests for:
//! - Boundary behaviors: zero nodes, empty batch layout, no-op recording
//! - Update invariants: frame index validation, build error surfacing
//! - Status poisoning: failed updates block recording until the next
//!   successful update
//! - Determinism: identical inputs compile to identical streams,
//!   transitions and placements
//! - Diagnostic snapshots

use trellis::{
    AccessAttr, AccessFlags, BufferView, CommandBuffer, Format, GraphError, ImageView, NodeArg,
    NodeDecl, NodeParamDecl, QueueClass, RecordCommandsInfo, RecordFlags, RenderGraph,
    RenderGraphCreateInfo, ResourceDesc, Semantic, ShaderStages, UpdateInfo,
};

fn write_decl(graph: &mut RenderGraph) -> u32 {
    graph.register_node_decl(NodeDecl::new("write", QueueClass::Graphics).with_param(
        NodeParamDecl::resource(
            "rt",
            AccessAttr::no_stages(AccessFlags::RENDER_TARGET),
            Semantic::RenderTarget,
        ),
    ))
}

fn read_decl(graph: &mut RenderGraph) -> u32 {
    graph.register_node_decl(NodeDecl::new("read", QueueClass::Graphics).with_param(
        NodeParamDecl::resource(
            "tex",
            AccessAttr::new(AccessFlags::SHADER_RESOURCE, ShaderStages::PS),
            Semantic::UserResourceBinding,
        ),
    ))
}

fn record_all(graph: &RenderGraph) -> trellis::Result<()> {
    graph.record_commands(&RecordCommandsInfo {
        command_buffer: CommandBuffer(1),
        user_context: 0,
        cmd_begin: 0,
        num_cmds: graph.runtime_cmds().len() as u32,
        flags: RecordFlags::empty(),
    })
}

// ============================================================================
// Boundary behaviors
// ============================================================================

#[test]
fn zero_nodes_compile_to_empty_layout() {
    let mut graph = RenderGraph::with_null_backend(RenderGraphCreateInfo::default());

    graph
        .update(&UpdateInfo::default(), |_builder| Ok(()))
        .expect("empty graph must compile");

    let layout = graph.batch_layout();
    assert!(layout.batches.is_empty());
    assert_eq!(layout.num_fence_signals, 0);

    // The stream holds only the sentinels; recording it is a no-op.
    assert_eq!(graph.runtime_cmds().len(), 2);
    record_all(&graph).expect("recording an empty graph is a no-op");
}

#[test]
fn update_rejects_implausible_frame_indices() {
    let mut graph = RenderGraph::with_null_backend(RenderGraphCreateInfo::default());

    let result = graph.update(
        &UpdateInfo {
            frame_index: 3,
            gpu_completed_frame_index: 5,
            ..UpdateInfo::default()
        },
        |_builder| Ok(()),
    );

    assert!(matches!(result, Err(GraphError::InvalidArguments(_))));
}

#[test]
fn build_callback_errors_abort_the_update() {
    let mut graph = RenderGraph::with_null_backend(RenderGraphCreateInfo::default());

    let result = graph.update(&UpdateInfo::default(), |_builder| {
        Err(GraphError::ValidationFailed)
    });

    assert_eq!(result, Err(GraphError::ValidationFailed));
}

#[test]
fn unbalanced_subgraph_is_invalid_program() {
    let mut graph = RenderGraph::with_null_backend(RenderGraphCreateInfo::default());

    let result = graph.update(&UpdateInfo::default(), |builder| {
        builder.begin_subgraph(trellis::graph::dag::SubgraphFlags::ATOMIC);
        Ok(())
    });

    assert_eq!(result, Err(GraphError::InvalidProgram));
}

#[test]
fn unknown_node_decl_fails_compilation() {
    let mut graph = RenderGraph::with_null_backend(RenderGraphCreateInfo::default());

    let result = graph.update(&UpdateInfo::default(), |builder| {
        builder.add_node(99, Vec::new(), None, 0);
        Ok(())
    });

    assert_eq!(result, Err(GraphError::UnknownNode));
}

// ============================================================================
// Status poisoning
// ============================================================================

#[test]
fn failed_update_blocks_recording_until_recovery() {
    let mut graph = RenderGraph::with_null_backend(RenderGraphCreateInfo::default());
    let write = write_decl(&mut graph);

    // A good frame first.
    graph
        .update(&UpdateInfo::default(), |builder| {
            let target =
                builder.declare_resource("color", ResourceDesc::image_2d(Format::Rgba8Unorm, 8, 8));
            builder.add_node(write, vec![NodeArg::image_view(ImageView::new(target))], None, 0);
            Ok(())
        })
        .unwrap();
    record_all(&graph).expect("healthy graph records fine");

    // Poison the graph.
    let failed = graph.update(&UpdateInfo::default(), |builder| {
        builder.add_node(99, Vec::new(), None, 0);
        Ok(())
    });
    assert_eq!(failed, Err(GraphError::UnknownNode));
    assert_eq!(record_all(&graph), Err(GraphError::InvalidOperation));

    // Recover.
    graph
        .update(&UpdateInfo::default(), |builder| {
            let target =
                builder.declare_resource("color", ResourceDesc::image_2d(Format::Rgba8Unorm, 8, 8));
            builder.add_node(write, vec![NodeArg::image_view(ImageView::new(target))], None, 0);
            Ok(())
        })
        .unwrap();
    record_all(&graph).expect("recording works again after a successful update");
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn identical_updates_compile_identically() {
    let mut graph = RenderGraph::with_null_backend(RenderGraphCreateInfo::default());
    let write = write_decl(&mut graph);
    let read = read_decl(&mut graph);

    let build = |builder: &mut trellis::GraphBuilder| {
        let color = builder.declare_resource("color", ResourceDesc::image_2d(Format::Rgba8Unorm, 64, 64));
        let staging = builder.declare_resource("staging", ResourceDesc::buffer(4096));
        builder.add_node(write, vec![NodeArg::image_view(ImageView::new(color))], None, 0);
        builder.add_node(read, vec![NodeArg::image_view(ImageView::new(color))], None, 0);
        let _ = staging;
        Ok(())
    };

    graph.update(&UpdateInfo::default(), build).unwrap();
    let first_cmds = graph.runtime_cmds().to_vec();
    let first_transitions = graph.transitions().to_vec();
    let first_placements: Vec<_> = graph
        .resource_instances()
        .iter()
        .map(|instance| instance.alloc_placement)
        .collect();
    let first_batches = graph.batch_layout().batches.to_vec();

    graph
        .update(
            &UpdateInfo {
                frame_index: 1,
                gpu_completed_frame_index: 0,
                ..UpdateInfo::default()
            },
            build,
        )
        .unwrap();

    assert_eq!(graph.runtime_cmds(), first_cmds.as_slice());
    assert_eq!(graph.transitions().len(), first_transitions.len());
    assert_eq!(graph.batch_layout().batches, first_batches.as_slice());
    let second_placements: Vec<_> = graph
        .resource_instances()
        .iter()
        .map(|instance| instance.alloc_placement)
        .collect();
    assert_eq!(first_placements, second_placements);
}

#[test]
fn dependencies_reorder_against_declaration_order() {
    let mut graph = RenderGraph::with_null_backend(RenderGraphCreateInfo::default());
    let write = write_decl(&mut graph);

    graph
        .update(&UpdateInfo::default(), |builder| {
            let a = builder.declare_resource("a", ResourceDesc::image_2d(Format::Rgba8Unorm, 8, 8));
            let b = builder.declare_resource("b", ResourceDesc::image_2d(Format::Rgba8Unorm, 8, 8));
            let first = builder.add_node(write, vec![NodeArg::image_view(ImageView::new(a))], None, 0);
            let second = builder.add_node(write, vec![NodeArg::image_view(ImageView::new(b))], None, 0);
            // Declared first, but must run second.
            builder.add_dependency(second, first)?;
            Ok(())
        })
        .unwrap();

    let node_order: Vec<_> = graph
        .runtime_cmds()
        .iter()
        .filter_map(trellis::graph::RuntimeCmdInfo::node_id)
        .collect();
    assert_eq!(node_order, vec![1, 0]);
}

// ============================================================================
// Diagnostics
// ============================================================================

#[test]
fn diagnostic_snapshots_are_stable() {
    let mut graph = RenderGraph::with_null_backend(RenderGraphCreateInfo::default());
    let write = write_decl(&mut graph);
    let read = read_decl(&mut graph);

    graph
        .update(&UpdateInfo::default(), |builder| {
            let color =
                builder.declare_resource("color", ResourceDesc::image_2d(Format::Rgba8Unorm, 32, 32));
            builder.add_node(write, vec![NodeArg::image_view(ImageView::new(color))], None, 0);
            builder.add_node(read, vec![NodeArg::image_view(ImageView::new(color))], None, 0);
            Ok(())
        })
        .unwrap();

    let first = graph.diagnostic_info(false).clone();
    let second = graph.diagnostic_info(true).clone();
    assert_eq!(first, second, "snapshot round-trips unchanged");

    assert_eq!(first.resources.len(), 1);
    assert_eq!(first.resources[0].name, "color");
    assert_eq!(first.cmds.len(), graph.runtime_cmds().len());

    // Transition records expose prev / next accesses.
    let transition = first
        .cmds
        .iter()
        .find_map(|cmd| cmd.transition.as_ref())
        .expect("stream contains transitions");
    assert_eq!(transition.prev_access, AccessAttr::UNKNOWN);
    assert!(transition.next_access.access.contains(AccessFlags::RENDER_TARGET));
}

#[test]
fn buffer_views_flow_through_unchanged() {
    let mut graph = RenderGraph::with_null_backend(RenderGraphCreateInfo::default());
    let read = graph.register_node_decl(NodeDecl::new("consume", QueueClass::Compute).with_param(
        NodeParamDecl::resource(
            "in",
            AccessAttr::new(AccessFlags::SHADER_RESOURCE, ShaderStages::CS),
            Semantic::UserResourceBinding,
        ),
    ));

    graph
        .update(&UpdateInfo::default(), |builder| {
            let buffer = builder.declare_resource("data", ResourceDesc::buffer(1 << 20));
            builder.add_node(
                read,
                vec![NodeArg::buffer_view(
                    BufferView::new(buffer).with_range(256, 1024),
                )],
                None,
                0,
            );
            Ok(())
        })
        .unwrap();

    let access = &graph.cmd_accesses(0)[0];
    assert_eq!(access.resource_id, 0);
    assert_eq!(access.range, trellis::SubresourceRange::whole_buffer());
}
