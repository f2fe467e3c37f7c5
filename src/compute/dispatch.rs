//! Kernel dispatch sizing.
//!
//! Kernels run over a grid of fixed-size execution groups. The group count on
//! each axis is the ceiling of `iterations / group_size`, so trailing partial
//! groups are included and the kernel bounds-checks threads past the domain edge.

use log::debug;

use super::{ComputeProgram, KernelHandle, SimulationError};

/// Threads per execution group, as declared by a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkgroupSize {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl WorkgroupSize {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.x > 0 && self.y > 0 && self.z > 0
    }

    #[inline]
    pub fn threads(&self) -> u32 {
        self.x * self.y * self.z
    }
}

/// Number of execution groups along each axis of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupCount {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl GroupCount {
    #[inline]
    pub fn total(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }
}

/// Groups needed to cover `iterations` threads per axis.
///
/// `group_size` must be valid (all axes non-zero).
#[inline]
pub fn group_counts(iterations: [u32; 3], group_size: WorkgroupSize) -> GroupCount {
    GroupCount {
        x: iterations[0].div_ceil(group_size.x),
        y: iterations[1].div_ceil(group_size.y),
        z: iterations[2].div_ceil(group_size.z),
    }
}

/// Issues dispatches sized from each kernel's group size.
///
/// Group sizes are queried once when the dispatcher is built and assumed
/// constant for the lifetime of the program.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    group_sizes: [WorkgroupSize; 3],
}

impl Dispatcher {
    /// Query and validate the group size of every kernel.
    pub fn new<P: ComputeProgram>(program: &P) -> Result<Self, SimulationError> {
        let mut group_sizes = [WorkgroupSize::new(1, 1, 1); 3];
        for kernel in KernelHandle::ALL {
            let size = program.workgroup_size(kernel);
            if !size.is_valid() {
                return Err(SimulationError::InvalidGroupSize { kernel, size });
            }
            group_sizes[kernel.index()] = size;
        }
        Ok(Self { group_sizes })
    }

    #[inline]
    pub fn group_size(&self, kernel: KernelHandle) -> WorkgroupSize {
        self.group_sizes[kernel.index()]
    }

    /// Groups required for `kernel` to cover the given iteration space.
    #[inline]
    pub fn groups_for(&self, kernel: KernelHandle, iterations: [u32; 3]) -> GroupCount {
        group_counts(iterations, self.group_size(kernel))
    }

    /// Dispatch `kernel` over a `x * y * z` iteration space.
    pub fn dispatch<P: ComputeProgram>(
        &self,
        program: &mut P,
        kernel: KernelHandle,
        x: u32,
        y: u32,
        z: u32,
    ) -> Result<GroupCount, SimulationError> {
        let groups = self.groups_for(kernel, [x, y, z]);
        debug!(
            "dispatch {:?}: {}x{}x{} -> groups {}x{}x{}",
            kernel, x, y, z, groups.x, groups.y, groups.z
        );
        program.dispatch(kernel, groups)?;
        Ok(groups)
    }

    /// Dispatch over a 2D domain (`z = 1`).
    #[inline]
    pub fn dispatch_2d<P: ComputeProgram>(
        &self,
        program: &mut P,
        kernel: KernelHandle,
        width: u32,
        height: u32,
    ) -> Result<GroupCount, SimulationError> {
        self.dispatch(program, kernel, width, height, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::CpuProgram;
    use proptest::prelude::*;

    const GROUP_8X8: WorkgroupSize = WorkgroupSize::new(8, 8, 1);

    #[test]
    fn test_exact_multiple() {
        let groups = group_counts([256, 256, 1], GROUP_8X8);
        assert_eq!(groups, GroupCount { x: 32, y: 32, z: 1 });
    }

    #[test]
    fn test_partial_trailing_group() {
        let groups = group_counts([257, 256, 1], GROUP_8X8);
        assert_eq!(groups, GroupCount { x: 33, y: 32, z: 1 });
    }

    #[test]
    fn test_axes_independent() {
        let groups = group_counts([1, 17, 9], WorkgroupSize::new(16, 4, 3));
        assert_eq!(groups, GroupCount { x: 1, y: 5, z: 3 });
        assert_eq!(groups.total(), 15);
    }

    #[test]
    fn test_zero_iterations_dispatches_nothing() {
        let groups = group_counts([0, 64, 1], GROUP_8X8);
        assert_eq!(groups.x, 0);
        assert_eq!(groups.total(), 0);
    }

    #[test]
    fn test_dispatcher_rejects_zero_group_size() {
        let program = CpuProgram::with_group_size(WorkgroupSize::new(8, 0, 1));
        let result = Dispatcher::new(&program);
        assert!(matches!(
            result,
            Err(SimulationError::InvalidGroupSize {
                kernel: KernelHandle::Init,
                ..
            })
        ));
    }

    #[test]
    fn test_dispatcher_queries_program_sizes() {
        let program = CpuProgram::with_group_size(WorkgroupSize::new(16, 4, 1));
        let dispatcher = Dispatcher::new(&program).unwrap();
        for kernel in KernelHandle::ALL {
            assert_eq!(dispatcher.group_size(kernel), WorkgroupSize::new(16, 4, 1));
        }
        assert_eq!(
            dispatcher.groups_for(KernelHandle::Step, [100, 10, 1]),
            GroupCount { x: 7, y: 3, z: 1 }
        );
    }

    proptest! {
        #[test]
        fn prop_groups_cover_domain_tightly(
            ix in 1u32..5000,
            iy in 1u32..5000,
            iz in 1u32..64,
            gx in 1u32..257,
            gy in 1u32..257,
            gz in 1u32..65,
        ) {
            let size = WorkgroupSize::new(gx, gy, gz);
            let groups = group_counts([ix, iy, iz], size);

            for (g, s, i) in [(groups.x, gx, ix), (groups.y, gy, iy), (groups.z, gz, iz)] {
                prop_assert!(g as u64 * s as u64 >= i as u64);
                prop_assert!((g as u64 - 1) * (s as u64) < i as u64);
            }
        }
    }
}
