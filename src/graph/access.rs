//! Resource Access Model
//!
//! An [`AccessAttr`] pairs a set of [`AccessFlags`] with the [`ShaderStages`]
//! allowed to perform the access. The flag bitfield implies the resource
//! layout: `SHADER_RESOURCE | DEPTH_READ` is a distinct layout from
//! `DEPTH_WRITE`. Decorator bits (discards, clear, render-pass, ordering
//! hints) refine behavior without changing layout.
//!
//! The algebra in this module answers three questions the compiler asks over
//! and over:
//!
//! - is an access read-only? ([`AccessAttr::is_read_only`])
//! - do two accesses resolve to the same layout?
//!   ([`AccessAttr::layout_equivalent`])
//! - can two accesses share one transition? ([`AccessAttr::can_merge`])
//!
//! Backends may refine the default answers through
//! [`RuntimeBackend::calculate_access_transition`], reporting an
//! [`AccessTransitionInfo`].
//!
//! [`RuntimeBackend::calculate_access_transition`]:
//!     crate::runtime::RuntimeBackend::calculate_access_transition

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Bitflags for resource (view) access attributes.
    ///
    /// When declared on a node parameter, these indicate the required
    /// resource layout and synchronization before entering and after exiting
    /// the node.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
    pub struct AccessFlags: u32 {
        /// Accessible as an indirect argument buffer.
        const INDIRECT_ARGS = 1 << 0;
        /// Accessible as an index buffer.
        const INDEX_BUFFER = 1 << 1;
        /// Accessible as a vertex buffer.
        const VERTEX_BUFFER = 1 << 2;
        /// Accessible as a constant buffer.
        const CONSTANT_BUFFER = 1 << 3;
        /// Accessible as a shader resource (read-only) view.
        const SHADER_RESOURCE = 1 << 4;
        /// Accessible as an unordered access (shader read-write) view.
        const UNORDERED_ACCESS = 1 << 5;
        /// Accessible as a shading rate image in a VRS pass.
        const SHADING_RATE = 1 << 6;
        /// Accessible as a render target view.
        const RENDER_TARGET = 1 << 7;
        /// Accessible as a read-only depth view.
        const DEPTH_READ = 1 << 8;
        /// Accessible as a writable depth view.
        const DEPTH_WRITE = 1 << 9;
        /// Accessible as a read-only stencil view.
        const STENCIL_READ = 1 << 10;
        /// Accessible as a writable stencil view.
        const STENCIL_WRITE = 1 << 11;
        /// Accessible for write as a stream-out buffer.
        const STREAM_OUT = 1 << 12;
        /// Accessible as a copy source.
        const COPY_SRC = 1 << 13;
        /// Accessible as a copy target.
        const COPY_DST = 1 << 14;
        /// Accessible as a resolve source.
        const RESOLVE_SRC = 1 << 15;
        /// Accessible as a resolve target.
        const RESOLVE_DST = 1 << 16;
        /// Accessible for write (build) as a raytracing acceleration structure.
        const RAYTRACING_AS_BUILD = 1 << 17;
        /// Accessible for read as a raytracing acceleration structure.
        const RAYTRACING_AS_READ = 1 << 18;
        /// Accessible as a present source.
        const PRESENT = 1 << 19;
        /// Accessible for reads by the CPU.
        const CPU_READ = 1 << 20;
        /// Accessible for writes by the CPU.
        const CPU_WRITE = 1 << 21;

        // Decorator flags, combined with basic access flags.

        /// Access does not read existing data, so it can be discarded before
        /// the node. Does not apply to the stencil aspect.
        const DISCARD_BEFORE = 1 << 22;
        /// Data can be discarded after the current node. Normally added by
        /// lifetime analysis rather than programmed directly.
        const DISCARD_AFTER = 1 << 23;
        /// Stencil variant of [`Self::DISCARD_BEFORE`].
        const STENCIL_DISCARD_BEFORE = 1 << 24;
        /// Stencil variant of [`Self::DISCARD_AFTER`].
        const STENCIL_DISCARD_AFTER = 1 << 25;
        /// Initial state when entering the node.
        const BEFORE = 1 << 26;
        /// Final state when exiting the node.
        const AFTER = 1 << 27;
        /// View is cleared before the current access.
        const CLEAR = 1 << 28;
        /// Access is used as a render pass attachment (as opposed to a
        /// clear-only access using dedicated clear commands).
        const RENDER_PASS = 1 << 29;
        /// Access does not care about ordering with regard to other
        /// relaxed-order accesses.
        const RELAXED_ORDER = 1 << 30;
        /// Access does not need a resource view to be created.
        const NO_VIEW = 1 << 31;
    }
}

impl AccessFlags {
    /// Depth read-write access.
    pub const DEPTH: Self = Self::DEPTH_READ.union(Self::DEPTH_WRITE);
    /// Stencil read-write access.
    pub const STENCIL: Self = Self::STENCIL_READ.union(Self::STENCIL_WRITE);
    /// Depth / stencil read access.
    pub const DEPTH_STENCIL_READ: Self = Self::DEPTH_READ.union(Self::STENCIL_READ);
    /// Depth / stencil write access.
    pub const DEPTH_STENCIL_WRITE: Self = Self::DEPTH_WRITE.union(Self::STENCIL_WRITE);
    /// Depth / stencil read-write access.
    pub const DEPTH_STENCIL: Self = Self::DEPTH_STENCIL_READ.union(Self::DEPTH_STENCIL_WRITE);

    /// All GPU-writable access flags.
    pub const ALL_GPU_WRITE: Self = Self::RENDER_TARGET
        .union(Self::UNORDERED_ACCESS)
        .union(Self::DEPTH_WRITE)
        .union(Self::STENCIL_WRITE)
        .union(Self::STREAM_OUT)
        .union(Self::COPY_DST)
        .union(Self::RESOLVE_DST)
        .union(Self::RAYTRACING_AS_BUILD);

    /// All GPU read-only access flags.
    pub const ALL_GPU_READONLY: Self = Self::INDIRECT_ARGS
        .union(Self::INDEX_BUFFER)
        .union(Self::VERTEX_BUFFER)
        .union(Self::CONSTANT_BUFFER)
        .union(Self::SHADER_RESOURCE)
        .union(Self::SHADING_RATE)
        .union(Self::DEPTH_READ)
        .union(Self::STENCIL_READ)
        .union(Self::COPY_SRC)
        .union(Self::RESOLVE_SRC)
        .union(Self::RAYTRACING_AS_READ)
        .union(Self::PRESENT);

    /// All GPU access flags.
    pub const ALL_GPU: Self = Self::ALL_GPU_WRITE.union(Self::ALL_GPU_READONLY);

    /// All CPU access flags.
    pub const ALL_CPU: Self = Self::CPU_READ.union(Self::CPU_WRITE);

    /// All GPU / CPU access flags, excluding decorators.
    pub const ALL_ACCESS_MASK: Self = Self::ALL_GPU.union(Self::ALL_CPU);

    /// Decorator bits masked out for layout comparison.
    pub const DECORATOR_MASK: Self = Self::DISCARD_BEFORE
        .union(Self::DISCARD_AFTER)
        .union(Self::STENCIL_DISCARD_BEFORE)
        .union(Self::STENCIL_DISCARD_AFTER)
        .union(Self::BEFORE)
        .union(Self::AFTER)
        .union(Self::CLEAR)
        .union(Self::RENDER_PASS)
        .union(Self::RELAXED_ORDER)
        .union(Self::NO_VIEW);
}

bitflags! {
    /// Bitflags for shader stages.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
    pub struct ShaderStages: u32 {
        /// Vertex shader stage.
        const VS = 1 << 0;
        /// Pixel shader stage.
        const PS = 1 << 1;
        /// Geometry shader stage.
        const GS = 1 << 2;
        /// Compute shader stage.
        const CS = 1 << 3;
        /// Hull shader stage.
        const HS = 1 << 4;
        /// Domain shader stage.
        const DS = 1 << 5;
        /// Raytracing shader stages.
        const RAYTRACING = 1 << 6;
        /// Amplification shader stage.
        const AS = 1 << 7;
        /// Mesh shader stage.
        const MS = 1 << 8;
    }
}

impl ShaderStages {
    /// All shader stages.
    pub const ALL: Self = Self::all();
}

/// Resource access attribute: access flags plus the shader stages allowed to
/// perform the access.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct AccessAttr {
    /// Access flags.
    pub access: AccessFlags,
    /// Shader stages allowed for the access, where applicable.
    pub stages: ShaderStages,
}

impl AccessAttr {
    /// The unknown access (no flags). Used as the initial state of freshly
    /// created or aliased-over resources.
    pub const UNKNOWN: Self = Self {
        access: AccessFlags::empty(),
        stages: ShaderStages::empty(),
    };

    /// Creates an access attribute.
    #[must_use]
    pub const fn new(access: AccessFlags, stages: ShaderStages) -> Self {
        Self { access, stages }
    }

    /// Creates an access attribute with no stage restriction.
    #[must_use]
    pub const fn no_stages(access: AccessFlags) -> Self {
        Self {
            access,
            stages: ShaderStages::empty(),
        }
    }

    /// Returns `true` if no access flags are set.
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        self.access.is_empty()
    }

    /// Returns `true` if the access performs no GPU or CPU writes.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        !self
            .access
            .intersects(AccessFlags::ALL_GPU_WRITE.union(AccessFlags::CPU_WRITE))
    }

    /// The layout-relevant access bits: everything except decorators.
    #[must_use]
    pub const fn layout_mask(&self) -> AccessFlags {
        self.access.difference(AccessFlags::DECORATOR_MASK)
    }

    /// Returns `true` if `self` and `other` resolve to the same layout, i.e.
    /// their access flags are equal after masking out decorator bits.
    #[must_use]
    pub const fn layout_equivalent(&self, other: &Self) -> bool {
        self.layout_mask().bits() == other.layout_mask().bits()
    }

    /// Returns `true` if `self` and `other` can share one combined access:
    /// both read-only, no conflicting layout bits in the union, stages ORable.
    ///
    /// Present and CPU accesses pin the layout and cannot combine with other
    /// read kinds.
    #[must_use]
    pub fn can_merge(&self, other: &Self) -> bool {
        if !self.is_read_only() || !other.is_read_only() {
            return false;
        }

        // Present and CPU reads pin the layout and cannot combine with any
        // other read kind.
        let merged = self.layout_mask() | other.layout_mask();
        let pinned = AccessFlags::PRESENT | AccessFlags::ALL_CPU;
        if merged.intersects(pinned) && !merged.difference(pinned).is_empty() {
            return false;
        }

        true
    }

    /// Per-field union.
    #[must_use]
    pub const fn union(&self, other: &Self) -> Self {
        Self {
            access: self.access.union(other.access),
            stages: self.stages.union(other.stages),
        }
    }
}

impl std::ops::BitOr for AccessAttr {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(&rhs)
    }
}

impl std::ops::BitOrAssign for AccessAttr {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(&rhs);
    }
}

impl fmt::Debug for AccessAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessAttr({self})")
    }
}

impl fmt::Display for AccessAttr {
    /// Renders the access in the debug-print spelling used by diagnostics,
    /// e.g. `color, clear`, `srv(ps)`, `depth_write` or `*` for unknown.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const ACCESS_NAMES: &[(AccessFlags, &str)] = &[
            (AccessFlags::INDIRECT_ARGS, "indirect_arg"),
            (AccessFlags::INDEX_BUFFER, "ib"),
            (AccessFlags::VERTEX_BUFFER, "vb"),
            (AccessFlags::CONSTANT_BUFFER, "cb"),
            (AccessFlags::SHADING_RATE, "shading_rate"),
            (AccessFlags::RENDER_TARGET, "color"),
            (AccessFlags::DEPTH_READ, "depth_read"),
            (AccessFlags::DEPTH_WRITE, "depth_write"),
            (AccessFlags::STENCIL_READ, "stencil_read"),
            (AccessFlags::STENCIL_WRITE, "stencil_write"),
            (AccessFlags::STREAM_OUT, "stream_out"),
            (AccessFlags::COPY_SRC, "copy_src"),
            (AccessFlags::COPY_DST, "copy_dst"),
            (AccessFlags::RESOLVE_SRC, "resolve_src"),
            (AccessFlags::RESOLVE_DST, "resolve_dst"),
            (AccessFlags::RAYTRACING_AS_BUILD, "rtas_build"),
            (AccessFlags::RAYTRACING_AS_READ, "rtas_read"),
            (AccessFlags::PRESENT, "present"),
            (AccessFlags::CPU_READ, "cpu_read"),
            (AccessFlags::CPU_WRITE, "cpu_write"),
            (AccessFlags::DISCARD_BEFORE, "discard_before"),
            (AccessFlags::DISCARD_AFTER, "discard_after"),
            (AccessFlags::STENCIL_DISCARD_BEFORE, "stencil_discard_before"),
            (AccessFlags::STENCIL_DISCARD_AFTER, "stencil_discard_after"),
            (AccessFlags::BEFORE, "before"),
            (AccessFlags::AFTER, "after"),
            (AccessFlags::CLEAR, "clear"),
            (AccessFlags::RENDER_PASS, "render_pass"),
            (AccessFlags::RELAXED_ORDER, "relaxed"),
            (AccessFlags::NO_VIEW, "no_view"),
        ];

        const STAGE_NAMES: &[(ShaderStages, &str)] = &[
            (ShaderStages::VS, "vs"),
            (ShaderStages::PS, "ps"),
            (ShaderStages::GS, "gs"),
            (ShaderStages::CS, "cs"),
            (ShaderStages::HS, "hs"),
            (ShaderStages::DS, "ds"),
            (ShaderStages::RAYTRACING, "rt"),
            (ShaderStages::AS, "as"),
            (ShaderStages::MS, "ms"),
        ];

        if self.access.is_empty() {
            return write!(f, "*");
        }

        let write_stages = |f: &mut fmt::Formatter<'_>| -> fmt::Result {
            let mut first = true;
            for &(stage, name) in STAGE_NAMES {
                if self.stages.contains(stage) {
                    if !first {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}")?;
                    first = false;
                }
            }
            Ok(())
        };

        let mut first = true;
        for &(flag, name) in ACCESS_NAMES {
            if self.access.contains(flag) {
                if !first {
                    write!(f, ", ")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }

        if self.access.contains(AccessFlags::UNORDERED_ACCESS) {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "uav(")?;
            write_stages(f)?;
            write!(f, ")")?;
            first = false;
        }

        if self.access.contains(AccessFlags::SHADER_RESOURCE) {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "srv(")?;
            write_stages(f)?;
            write!(f, ")")?;
        }

        Ok(())
    }
}

/// The backend's answer for an ordered access pair `(before, after)`:
/// whether a transition is required, whether the two states merge, and
/// whether ordering must still be preserved without a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessTransitionInfo {
    /// A transition must be recorded between the two accesses.
    pub transition: bool,
    /// The two access states merge into `merged_access`.
    pub merged_access_states: bool,
    /// Execution ordering must be preserved even without a transition.
    pub keep_ordering: bool,
    /// The merged access when `merged_access_states` is set.
    pub merged_access: AccessAttr,
}

impl AccessTransitionInfo {
    /// The engine's default transition decision, used when the backend
    /// declines to refine the pair.
    ///
    /// A transition is required when the layouts differ or when either side
    /// writes (write-write hazards need synchronization even in one layout).
    /// Compatible read-only accesses merge, OR-ing stages.
    #[must_use]
    pub fn default_for(before: &AccessAttr, after: &AccessAttr) -> Self {
        if before.is_unknown() {
            return Self {
                transition: true,
                merged_access_states: false,
                keep_ordering: false,
                merged_access: *after,
            };
        }

        if before.layout_equivalent(after) {
            let writes = !before.is_read_only() || !after.is_read_only();
            return Self {
                transition: writes,
                merged_access_states: !writes,
                keep_ordering: writes,
                merged_access: before.union(after),
            };
        }

        if before.can_merge(after) {
            return Self {
                transition: false,
                merged_access_states: true,
                keep_ordering: false,
                merged_access: before.union(after),
            };
        }

        Self {
            transition: true,
            merged_access_states: false,
            keep_ordering: true,
            merged_access: *after,
        }
    }
}
