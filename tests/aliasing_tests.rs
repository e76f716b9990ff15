//! Memory Aliasing Tests
//!
//! Tests for:
//! - Lifetime-disjoint transients sharing one heap offset, with the
//!   src-deactivating / dst-activating record pair (S4)
//! - Overlapping lifetimes getting disjoint placements
//! - Persistent resources taking sticky placements outside the transient
//!   region
//! - Heap size caps surfacing out-of-memory
//! - Disabling aliasing via graph flags

use trellis::{
    AccessAttr, AccessFlags, BufferView, GraphError, NodeArg, NodeDecl, NodeParamDecl, QueueClass,
    RenderGraph, RenderGraphCreateInfo, RenderGraphFlags, ResourceDesc, ResourceFlags,
    ShaderStages, Semantic, UpdateInfo,
};

const FOUR_MIB: u64 = 4 * 1024 * 1024;

fn buffer_write_decl(graph: &mut RenderGraph) -> u32 {
    graph.register_node_decl(NodeDecl::new("fill", QueueClass::Graphics).with_param(
        NodeParamDecl::resource(
            "out",
            AccessAttr::new(AccessFlags::UNORDERED_ACCESS, ShaderStages::CS),
            Semantic::UserResourceBinding,
        ),
    ))
}

fn buffer_read_decl(graph: &mut RenderGraph) -> u32 {
    graph.register_node_decl(NodeDecl::new("drain", QueueClass::Graphics).with_param(
        NodeParamDecl::resource(
            "in",
            AccessAttr::new(AccessFlags::SHADER_RESOURCE, ShaderStages::CS),
            Semantic::UserResourceBinding,
        ),
    ))
}

/// Two 4 MiB buffers with back-to-back lifetimes on one heap.
fn disjoint_lifetime_graph() -> RenderGraph {
    let mut graph = RenderGraph::with_null_backend(RenderGraphCreateInfo::default());
    let write = buffer_write_decl(&mut graph);
    let read = buffer_read_decl(&mut graph);

    graph
        .update(&UpdateInfo::default(), |builder| {
            let first = builder.declare_resource("scratch_a", ResourceDesc::buffer(FOUR_MIB));
            let second = builder.declare_resource("scratch_b", ResourceDesc::buffer(FOUR_MIB));
            builder.add_node(write, vec![NodeArg::buffer_view(BufferView::new(first))], None, 0);
            builder.add_node(read, vec![NodeArg::buffer_view(BufferView::new(first))], None, 0);
            builder.add_node(write, vec![NodeArg::buffer_view(BufferView::new(second))], None, 0);
            builder.add_node(read, vec![NodeArg::buffer_view(BufferView::new(second))], None, 0);
            Ok(())
        })
        .unwrap();

    graph
}

// ============================================================================
// S4 — aliasing
// ============================================================================

#[test]
fn disjoint_lifetimes_share_one_placement() {
    let graph = disjoint_lifetime_graph();

    let first = graph.resource_instance(0).unwrap();
    let second = graph.resource_instance(1).unwrap();

    assert!(first.lifetime_end < second.lifetime_begin);

    assert!(first.alloc_placement.is_placed());
    assert_eq!(
        first.alloc_placement.heap_id,
        second.alloc_placement.heap_id
    );
    assert_eq!(first.alloc_placement.offset, second.alloc_placement.offset);
    assert!(first.is_aliased);
    assert!(second.is_aliased);

    // One heap, large enough for a single tenant.
    assert_eq!(graph.heaps().len(), 1);
    assert!(graph.heaps()[0].size >= FOUR_MIB);
    assert_eq!(graph.heaps()[0].used_size, FOUR_MIB);
}

#[test]
fn aliasing_records_attach_to_lifetime_boundaries() {
    let graph = disjoint_lifetime_graph();

    let first = graph.resource_instance(0).unwrap();
    let second = graph.resource_instance(1).unwrap();

    let deactivations = graph.aliasing_infos(first.lifetime_end);
    assert_eq!(deactivations.len(), 1);
    assert!(deactivations[0].src_deactivating);
    assert!(!deactivations[0].dst_activating);
    assert_eq!(deactivations[0].src_resource_id, 0);
    assert_eq!(deactivations[0].dst_resource_id, 1);

    let activations = graph.aliasing_infos(second.lifetime_begin);
    assert_eq!(activations.len(), 1);
    assert!(activations[0].dst_activating);
    assert!(!activations[0].src_deactivating);
}

#[test]
fn aliased_resources_forget_their_final_access() {
    let graph = disjoint_lifetime_graph();

    // The null backend resets carried state of aliased slots: next frame's
    // first use transitions from an undefined state.
    let first = graph.resource_instance(0).unwrap();
    assert_eq!(first.prev_final_access, AccessAttr::UNKNOWN);
}

// ============================================================================
// Overlap and growth
// ============================================================================

#[test]
fn overlapping_lifetimes_get_disjoint_placements() {
    let mut graph = RenderGraph::with_null_backend(RenderGraphCreateInfo::default());
    let write = buffer_write_decl(&mut graph);
    let read = buffer_read_decl(&mut graph);

    graph
        .update(&UpdateInfo::default(), |builder| {
            let first = builder.declare_resource("a", ResourceDesc::buffer(FOUR_MIB));
            let second = builder.declare_resource("b", ResourceDesc::buffer(FOUR_MIB));
            // Interleaved: a is still alive when b starts.
            builder.add_node(write, vec![NodeArg::buffer_view(BufferView::new(first))], None, 0);
            builder.add_node(write, vec![NodeArg::buffer_view(BufferView::new(second))], None, 0);
            builder.add_node(read, vec![NodeArg::buffer_view(BufferView::new(first))], None, 0);
            builder.add_node(read, vec![NodeArg::buffer_view(BufferView::new(second))], None, 0);
            Ok(())
        })
        .unwrap();

    let first = graph.resource_instance(0).unwrap();
    let second = graph.resource_instance(1).unwrap();

    assert_eq!(first.alloc_placement.heap_id, second.alloc_placement.heap_id);
    assert_ne!(first.alloc_placement.offset, second.alloc_placement.offset);
    assert!(!first.is_aliased);
    assert!(!second.is_aliased);
    assert!(graph.heaps()[0].size >= 2 * FOUR_MIB);
}

#[test]
fn persistent_resources_never_alias() {
    let mut graph = RenderGraph::with_null_backend(RenderGraphCreateInfo::default());
    let write = buffer_write_decl(&mut graph);
    let read = buffer_read_decl(&mut graph);

    graph
        .update(&UpdateInfo::default(), |builder| {
            let keeper = builder.declare_resource(
                "keeper",
                ResourceDesc::buffer(FOUR_MIB).with_flags(ResourceFlags::PERSISTENT),
            );
            let transient = builder.declare_resource("transient", ResourceDesc::buffer(FOUR_MIB));
            builder.add_node(write, vec![NodeArg::buffer_view(BufferView::new(keeper))], None, 0);
            builder.add_node(read, vec![NodeArg::buffer_view(BufferView::new(keeper))], None, 0);
            builder.add_node(write, vec![NodeArg::buffer_view(BufferView::new(transient))], None, 0);
            Ok(())
        })
        .unwrap();

    let keeper = graph.resource_instance(0).unwrap();
    let transient = graph.resource_instance(1).unwrap();

    assert!(!keeper.is_aliased);
    assert_ne!(
        keeper.alloc_placement.offset, transient.alloc_placement.offset,
        "the transient region starts past the persistent region"
    );
}

#[test]
fn no_aliasing_flag_keeps_placements_disjoint() {
    let create_info = RenderGraphCreateInfo {
        flags: RenderGraphFlags::NO_GPU_MEMORY_ALIASING,
        ..Default::default()
    };
    let mut graph = RenderGraph::with_null_backend(create_info);
    let write = buffer_write_decl(&mut graph);
    let read = buffer_read_decl(&mut graph);

    graph
        .update(&UpdateInfo::default(), |builder| {
            let first = builder.declare_resource("a", ResourceDesc::buffer(FOUR_MIB));
            let second = builder.declare_resource("b", ResourceDesc::buffer(FOUR_MIB));
            builder.add_node(write, vec![NodeArg::buffer_view(BufferView::new(first))], None, 0);
            builder.add_node(read, vec![NodeArg::buffer_view(BufferView::new(first))], None, 0);
            builder.add_node(write, vec![NodeArg::buffer_view(BufferView::new(second))], None, 0);
            Ok(())
        })
        .unwrap();

    let first = graph.resource_instance(0).unwrap();
    let second = graph.resource_instance(1).unwrap();
    assert_ne!(first.alloc_placement.offset, second.alloc_placement.offset);
    assert!(!first.is_aliased);
    assert!(!second.is_aliased);
}

// ============================================================================
// Failure modes
// ============================================================================

#[test]
fn heap_cap_overflow_is_out_of_memory() {
    let create_info = RenderGraphCreateInfo {
        max_heap_size: Some(1024),
        ..Default::default()
    };
    let mut graph = RenderGraph::with_null_backend(create_info);
    let write = buffer_write_decl(&mut graph);

    let result = graph.update(&UpdateInfo::default(), |builder| {
        let huge = builder.declare_resource("huge", ResourceDesc::buffer(FOUR_MIB));
        builder.add_node(write, vec![NodeArg::buffer_view(BufferView::new(huge))], None, 0);
        Ok(())
    });

    assert_eq!(result, Err(GraphError::OutOfMemory));
}
