//! Record Driver Tests
//!
//! Tests for:
//! - Callback dispatch in stream order with forwarded user context
//! - Error reporting: first error wins, later callbacks are skipped while
//!   render-pass begin / end hooks stay balanced (S6)
//! - Context cloning for secondary command buffers
//! - Debug marker emission behind the record flag
//! - Transition records reaching the backend with correct prev / next
//!   accesses

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use trellis::runtime::backend::{CreateResourceArgs, HeapInfo, RuntimeHeap, TransitionRecord};
use trellis::{
    AccessAttr, AccessFlags, CmdCallbackContext, CommandBuffer, Format, GraphError, ImageView,
    NodeArg, NodeDecl, NodeParamDecl, QueueClass, RecordCommandsInfo, RecordFlags, RenderGraph,
    RenderGraphCreateInfo, ResourceDesc, ResourceType, RuntimeBackend, RuntimeResource, Semantic,
    UpdateInfo,
};

// ============================================================================
// Test backend
// ============================================================================

#[derive(Default)]
struct Counters {
    pass_begins: AtomicU32,
    pass_ends: AtomicU32,
    markers: AtomicU32,
    transitions: Mutex<Vec<TransitionRecord>>,
}

struct CountingBackend {
    counters: Arc<Counters>,
    next_handle: AtomicU64,
}

impl CountingBackend {
    fn new(counters: Arc<Counters>) -> Self {
        Self {
            counters,
            next_handle: AtomicU64::new(1),
        }
    }
}

impl RuntimeBackend for CountingBackend {
    fn create_heap(&mut self, _heap: &HeapInfo, _debug_name: &str) -> trellis::Result<RuntimeHeap> {
        Ok(RuntimeHeap(self.next_handle.fetch_add(1, Ordering::Relaxed)))
    }

    fn destroy_heaps(&mut self, _heaps: &mut [HeapInfo]) {}

    fn create_resource(
        &mut self,
        _args: &CreateResourceArgs<'_>,
    ) -> trellis::Result<RuntimeResource> {
        Ok(RuntimeResource(
            self.next_handle.fetch_add(1, Ordering::Relaxed),
        ))
    }

    fn destroy_resources(&mut self, _ty: ResourceType, _resources: &[RuntimeResource]) {}

    fn destroy_resource_deferred(&mut self, _ty: ResourceType, _resource: RuntimeResource) {}

    fn record_transition(&self, _command_buffer: CommandBuffer, transition: &TransitionRecord) {
        self.counters.transitions.lock().unwrap().push(*transition);
    }

    fn record_render_pass_begin(&self, _context: &CmdCallbackContext<'_>) -> trellis::Result<()> {
        self.counters.pass_begins.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn record_render_pass_end(&self, _context: &CmdCallbackContext<'_>) -> trellis::Result<()> {
        self.counters.pass_ends.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn record_debug_marker(
        &self,
        _command_buffer: CommandBuffer,
        _mode: trellis::DebugMarkerMode,
        _text: &str,
    ) {
        self.counters.markers.fetch_add(1, Ordering::Relaxed);
    }
}

fn write_decl(graph: &mut RenderGraph) -> u32 {
    graph.register_node_decl(NodeDecl::new("write", QueueClass::Graphics).with_param(
        NodeParamDecl::resource(
            "rt",
            AccessAttr::no_stages(AccessFlags::RENDER_TARGET),
            Semantic::RenderTarget,
        ),
    ))
}

fn record_all(graph: &RenderGraph, flags: RecordFlags) -> trellis::Result<()> {
    graph.record_commands(&RecordCommandsInfo {
        command_buffer: CommandBuffer(7),
        user_context: 42,
        cmd_begin: 0,
        num_cmds: graph.runtime_cmds().len() as u32,
        flags,
    })
}

// ============================================================================
// Callback dispatch
// ============================================================================

#[test]
fn callbacks_run_in_stream_order_with_user_context() {
    let mut graph = RenderGraph::with_null_backend(RenderGraphCreateInfo::default());
    let write = write_decl(&mut graph);

    let order: Arc<Mutex<Vec<u64>>> = Arc::default();

    graph
        .update(&UpdateInfo::default(), |builder| {
            let target =
                builder.declare_resource("color", ResourceDesc::image_2d(Format::Rgba8Unorm, 8, 8));
            for tag in [10u64, 20, 30] {
                let order = Arc::clone(&order);
                builder.add_node(
                    write,
                    vec![NodeArg::image_view(ImageView::new(target))],
                    Some(Arc::new(move |ctx: &CmdCallbackContext<'_>| {
                        assert_eq!(ctx.user_context, 42);
                        assert_eq!(ctx.node_name(), "write");
                        order.lock().unwrap().push(ctx.user_tag);
                    })),
                    tag,
                );
            }
            Ok(())
        })
        .unwrap();

    record_all(&graph, RecordFlags::empty()).unwrap();
    assert_eq!(*order.lock().unwrap(), vec![10, 20, 30]);
}

#[test]
fn partial_ranges_record_only_their_nodes() {
    let mut graph = RenderGraph::with_null_backend(RenderGraphCreateInfo::default());
    let write = write_decl(&mut graph);

    let invocations = Arc::new(AtomicU32::new(0));

    graph
        .update(&UpdateInfo::default(), |builder| {
            let target =
                builder.declare_resource("color", ResourceDesc::image_2d(Format::Rgba8Unorm, 8, 8));
            for _ in 0..3 {
                let invocations = Arc::clone(&invocations);
                builder.add_node(
                    write,
                    vec![NodeArg::image_view(ImageView::new(target))],
                    Some(Arc::new(move |_ctx: &CmdCallbackContext<'_>| {
                        invocations.fetch_add(1, Ordering::Relaxed);
                    })),
                    0,
                );
            }
            Ok(())
        })
        .unwrap();

    // Stream: [preamble, T, n0, T, n1, T, n2, postamble]. Record only the
    // slice holding the first node.
    graph
        .record_commands(&RecordCommandsInfo {
            command_buffer: CommandBuffer(1),
            user_context: 0,
            cmd_begin: 0,
            num_cmds: 3,
            flags: RecordFlags::empty(),
        })
        .unwrap();

    assert_eq!(invocations.load(Ordering::Relaxed), 1);
}

// ============================================================================
// S6 — error propagation
// ============================================================================

#[test]
fn first_error_wins_and_hooks_stay_balanced() {
    let counters = Arc::new(Counters::default());
    let mut graph = RenderGraph::new(
        RenderGraphCreateInfo::default(),
        Box::new(CountingBackend::new(Arc::clone(&counters))),
    );
    let write = write_decl(&mut graph);

    let invocations = Arc::new(AtomicU32::new(0));

    graph
        .update(&UpdateInfo::default(), |builder| {
            let target =
                builder.declare_resource("color", ResourceDesc::image_2d(Format::Rgba8Unorm, 8, 8));
            for index in 0..5u32 {
                let invocations = Arc::clone(&invocations);
                builder.add_node(
                    write,
                    vec![NodeArg::image_view(ImageView::new(target))],
                    Some(Arc::new(move |ctx: &CmdCallbackContext<'_>| {
                        invocations.fetch_add(1, Ordering::Relaxed);
                        if index == 2 {
                            ctx.report_error(GraphError::InternalError).unwrap();
                        }
                    })),
                    u64::from(index),
                );
            }
            Ok(())
        })
        .unwrap();

    let result = record_all(&graph, RecordFlags::empty());
    assert_eq!(result, Err(GraphError::InternalError));

    // Callbacks before and including the failing node ran; later ones were
    // skipped.
    assert_eq!(invocations.load(Ordering::Relaxed), 3);

    // Every node still received its render-pass begin / end hooks.
    assert_eq!(counters.pass_begins.load(Ordering::Relaxed), 5);
    assert_eq!(counters.pass_ends.load(Ordering::Relaxed), 5);
}

#[test]
fn double_report_is_invalid_operation() {
    let mut graph = RenderGraph::with_null_backend(RenderGraphCreateInfo::default());
    let write = write_decl(&mut graph);

    graph
        .update(&UpdateInfo::default(), |builder| {
            let target =
                builder.declare_resource("color", ResourceDesc::image_2d(Format::Rgba8Unorm, 8, 8));
            builder.add_node(
                write,
                vec![NodeArg::image_view(ImageView::new(target))],
                Some(Arc::new(|ctx: &CmdCallbackContext<'_>| {
                    ctx.report_error(GraphError::InvalidData).unwrap();
                    assert_eq!(
                        ctx.report_error(GraphError::InternalError),
                        Err(GraphError::InvalidOperation),
                        "first error wins"
                    );
                })),
                0,
            );
            Ok(())
        })
        .unwrap();

    assert_eq!(
        record_all(&graph, RecordFlags::empty()),
        Err(GraphError::InvalidData)
    );
}

// ============================================================================
// Context cloning
// ============================================================================

#[test]
fn cloned_contexts_target_new_buffers_and_cannot_report() {
    let mut graph = RenderGraph::with_null_backend(RenderGraphCreateInfo::default());
    let write = write_decl(&mut graph);

    graph
        .update(&UpdateInfo::default(), |builder| {
            let target =
                builder.declare_resource("color", ResourceDesc::image_2d(Format::Rgba8Unorm, 8, 8));
            builder.add_node(
                write,
                vec![NodeArg::image_view(ImageView::new(target))],
                Some(Arc::new(|ctx: &CmdCallbackContext<'_>| {
                    assert!(ctx.is_primary());

                    let secondary = ctx.clone_for_command_buffer(CommandBuffer(99));
                    assert!(!secondary.is_primary());
                    assert_eq!(secondary.command_buffer, CommandBuffer(99));
                    assert_eq!(secondary.cmd_id, ctx.cmd_id);

                    // Clones cannot report through the shared error slot.
                    assert_eq!(
                        secondary.report_error(GraphError::InternalError),
                        Err(GraphError::InvalidOperation)
                    );

                    // The primary remains valid and typed accessors work on
                    // both.
                    assert_eq!(ctx.render_target_info().unwrap().num_render_targets, 1);
                    assert!(secondary.runtime_resource_arg(0, 0).is_ok());
                })),
                0,
            );
            Ok(())
        })
        .unwrap();

    record_all(&graph, RecordFlags::empty()).unwrap();
}

// ============================================================================
// Markers and transitions
// ============================================================================

#[test]
fn debug_markers_are_emitted_behind_the_flag() {
    let counters = Arc::new(Counters::default());
    let mut graph = RenderGraph::new(
        RenderGraphCreateInfo::default(),
        Box::new(CountingBackend::new(Arc::clone(&counters))),
    );
    let write = write_decl(&mut graph);

    graph
        .update(&UpdateInfo::default(), |builder| {
            let target =
                builder.declare_resource("color", ResourceDesc::image_2d(Format::Rgba8Unorm, 8, 8));
            builder.add_node(write, vec![NodeArg::image_view(ImageView::new(target))], None, 0);
            builder.add_node(write, vec![NodeArg::image_view(ImageView::new(target))], None, 0);
            Ok(())
        })
        .unwrap();

    record_all(&graph, RecordFlags::empty()).unwrap();
    assert_eq!(counters.markers.load(Ordering::Relaxed), 0);

    record_all(&graph, RecordFlags::ENABLE_DEBUG_MARKERS).unwrap();
    assert_eq!(
        counters.markers.load(Ordering::Relaxed),
        4,
        "begin and end per node"
    );
}

#[test]
fn transitions_reach_the_backend_with_access_pair() {
    let counters = Arc::new(Counters::default());
    let mut graph = RenderGraph::new(
        RenderGraphCreateInfo::default(),
        Box::new(CountingBackend::new(Arc::clone(&counters))),
    );
    let write = write_decl(&mut graph);

    graph
        .update(&UpdateInfo::default(), |builder| {
            let target =
                builder.declare_resource("color", ResourceDesc::image_2d(Format::Rgba8Unorm, 8, 8));
            builder.add_node(write, vec![NodeArg::image_view(ImageView::new(target))], None, 0);
            Ok(())
        })
        .unwrap();

    record_all(&graph, RecordFlags::empty()).unwrap();

    let transitions = counters.transitions.lock().unwrap();
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].prev_access, AccessAttr::UNKNOWN);
    assert!(transitions[0]
        .next_access
        .access
        .contains(AccessFlags::RENDER_TARGET));
    assert_ne!(transitions[0].resource.0, 0, "backend handle is live");
}
