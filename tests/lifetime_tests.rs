//! Lifetime Analysis Tests
//!
//! Tests for:
//! - Discard promotion: write-then-read chains gain discard-before on the
//!   producer and discard-after on the last consumer (S3)
//! - Persistent resources: full-frame lifetimes, no discard promotion
//! - Per-aspect stencil tracking on depth-stencil images
//! - Lifetime intervals in runtime-cmd index space

use trellis::{
    AccessAttr, AccessFlags, Format, ImageView, NodeArg, NodeDecl, NodeParamDecl, QueueClass,
    RenderGraph, RenderGraphCreateInfo, ResourceDesc, ResourceFlags, Semantic, ShaderStages,
    UpdateInfo,
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

// ============================================================================
// S3 — discard promotion
// ============================================================================

#[test]
fn write_read_chain_promotes_discards() {
    let mut graph = RenderGraph::with_null_backend(RenderGraphCreateInfo::default());
    let write = write_decl(&mut graph);
    let read = read_decl(&mut graph);

    graph
        .update(&UpdateInfo::default(), |builder| {
            let target =
                builder.declare_resource("color", ResourceDesc::image_2d(Format::Rgba8Unorm, 64, 64));
            builder.add_node(write, vec![NodeArg::image_view(ImageView::new(target))], None, 0);
            builder.add_node(read, vec![NodeArg::image_view(ImageView::new(target))], None, 0);
            Ok(())
        })
        .unwrap();

    // The producer never reads existing data: forward scan finds the target
    // inactive before node A.
    let write_access = &graph.cmd_accesses(0)[0];
    assert!(write_access.access.access.contains(AccessFlags::DISCARD_BEFORE));

    // Nothing reads the target after node B: reverse scan promotes
    // discard-after onto the consumer.
    let read_access = &graph.cmd_accesses(1)[0];
    assert!(read_access.access.access.contains(AccessFlags::DISCARD_AFTER));
    assert!(!read_access.access.access.contains(AccessFlags::DISCARD_BEFORE));
}

#[test]
fn further_reads_block_discard_after() {
    let mut graph = RenderGraph::with_null_backend(RenderGraphCreateInfo::default());
    let write = write_decl(&mut graph);
    let read = read_decl(&mut graph);

    graph
        .update(&UpdateInfo::default(), |builder| {
            let target =
                builder.declare_resource("color", ResourceDesc::image_2d(Format::Rgba8Unorm, 64, 64));
            builder.add_node(write, vec![NodeArg::image_view(ImageView::new(target))], None, 0);
            builder.add_node(read, vec![NodeArg::image_view(ImageView::new(target))], None, 0);
            builder.add_node(read, vec![NodeArg::image_view(ImageView::new(target))], None, 0);
            Ok(())
        })
        .unwrap();

    let first_read = &graph.cmd_accesses(1)[0];
    assert!(
        !first_read.access.access.contains(AccessFlags::DISCARD_AFTER),
        "a later read keeps the data alive"
    );
    let last_read = &graph.cmd_accesses(2)[0];
    assert!(last_read.access.access.contains(AccessFlags::DISCARD_AFTER));
}

// ============================================================================
// Persistent resources
// ============================================================================

#[test]
fn persistent_resources_span_the_frame_and_keep_data() {
    let mut graph = RenderGraph::with_null_backend(RenderGraphCreateInfo::default());
    let write = write_decl(&mut graph);

    graph
        .update(&UpdateInfo::default(), |builder| {
            let target = builder.declare_resource(
                "history",
                ResourceDesc::image_2d(Format::Rgba8Unorm, 64, 64)
                    .with_flags(ResourceFlags::PERSISTENT),
            );
            builder.add_node(write, vec![NodeArg::image_view(ImageView::new(target))], None, 0);
            Ok(())
        })
        .unwrap();

    let instance = graph.resource_instance(0).unwrap();
    assert_eq!(instance.lifetime_begin, 0);
    assert_eq!(
        instance.lifetime_end as usize,
        graph.runtime_cmds().len() - 1
    );

    // Persistent data is live coming into the frame: the write is not a
    // discard-before candidate.
    let write_access = &graph.cmd_accesses(0)[0];
    assert!(!write_access.access.access.contains(AccessFlags::DISCARD_BEFORE));
    assert!(!write_access.access.access.contains(AccessFlags::DISCARD_AFTER));
}

#[test]
fn transient_lifetime_covers_transitions_and_uses() {
    let mut graph = RenderGraph::with_null_backend(RenderGraphCreateInfo::default());
    let write = write_decl(&mut graph);
    let read = read_decl(&mut graph);

    graph
        .update(&UpdateInfo::default(), |builder| {
            let target =
                builder.declare_resource("color", ResourceDesc::image_2d(Format::Rgba8Unorm, 64, 64));
            builder.add_node(write, vec![NodeArg::image_view(ImageView::new(target))], None, 0);
            builder.add_node(read, vec![NodeArg::image_view(ImageView::new(target))], None, 0);
            Ok(())
        })
        .unwrap();

    // Stream: [preamble, T(rt), write, T(srv), read, postamble]
    let instance = graph.resource_instance(0).unwrap();
    assert!(instance.lifetime_begin <= instance.lifetime_end);
    assert_eq!(instance.lifetime_begin, 1, "starts at the first transition");
    assert_eq!(instance.lifetime_end, 4, "ends at the last consuming node");
}

// ============================================================================
// Stencil aspect tracking
// ============================================================================

#[test]
fn stencil_aspect_discards_independently() {
    let mut graph = RenderGraph::with_null_backend(RenderGraphCreateInfo::default());
    let depth_stencil_write = graph.register_node_decl(
        NodeDecl::new("z_prepass", QueueClass::Graphics).with_param(NodeParamDecl::resource(
            "ds",
            AccessAttr::no_stages(AccessFlags::DEPTH_WRITE | AccessFlags::STENCIL_WRITE),
            Semantic::DepthStencilTarget,
        )),
    );
    let depth_read = graph.register_node_decl(
        NodeDecl::new("depth_sample", QueueClass::Graphics).with_param(NodeParamDecl::resource(
            "depth",
            AccessAttr::new(
                AccessFlags::SHADER_RESOURCE | AccessFlags::DEPTH_READ,
                ShaderStages::PS,
            ),
            Semantic::UserResourceBinding,
        )),
    );

    graph
        .update(&UpdateInfo::default(), |builder| {
            let target = builder.declare_resource(
                "depth",
                ResourceDesc::image_2d(Format::D24UnormS8Uint, 64, 64),
            );
            builder.add_node(
                depth_stencil_write,
                vec![NodeArg::image_view(ImageView::new(target))],
                None,
                0,
            );
            builder.add_node(
                depth_read,
                vec![NodeArg::image_view(ImageView::new(target))],
                None,
                0,
            );
            Ok(())
        })
        .unwrap();

    // The depth plane is read afterwards; the stencil plane never is. The
    // writer keeps its depth data but may discard stencil after the pass.
    let writer_access = &graph.cmd_accesses(0)[0];
    assert!(!writer_access.access.access.contains(AccessFlags::DISCARD_AFTER));
    assert!(writer_access
        .access
        .access
        .contains(AccessFlags::STENCIL_DISCARD_AFTER));

    // The depth-only read addresses only the depth plane.
    let reader_access = &graph.cmd_accesses(1)[0];
    assert_eq!(reader_access.range.aspect_mask, 0b01);
    assert!(reader_access.access.access.contains(AccessFlags::DISCARD_AFTER));
}
