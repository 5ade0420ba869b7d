//! Compute work-group shapes, device limits and dispatch grid sizing.

/// Work-group shape a compute kernel was compiled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuThreads {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl GpuThreads {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Total invocations per work-group.
    #[inline]
    pub fn invocations(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }

    /// Check the shape against device limits.
    ///
    /// A failure here means no correct dispatch grid exists, so callers treat
    /// it as fatal.
    pub fn validate(&self, limits: &DeviceLimits) -> Result<(), ThreadGroupError> {
        if self.x == 0 || self.y == 0 || self.z == 0 {
            return Err(ThreadGroupError::ZeroAxis(*self));
        }
        if self.invocations() > limits.max_invocations as u64 {
            return Err(ThreadGroupError::TooManyInvocations {
                invocations: self.invocations(),
                max: limits.max_invocations,
            });
        }
        for (axis, size, max) in [
            ('x', self.x, limits.max_x),
            ('y', self.y, limits.max_y),
            ('z', self.z, limits.max_z),
        ] {
            if size > max {
                return Err(ThreadGroupError::AxisTooLarge { axis, size, max });
            }
        }
        Ok(())
    }

    /// Work-groups needed to cover a `width` x `height` grid.
    ///
    /// Each axis is `ceil(dim / threads)`.
    #[inline]
    pub fn dispatch_grid(&self, width: u32, height: u32) -> [u32; 3] {
        [width.div_ceil(self.x), height.div_ceil(self.y), 1]
    }

    /// [`dispatch_grid`](Self::dispatch_grid), rejecting grids the device cannot launch.
    pub fn dispatch_grid_checked(
        &self,
        width: u32,
        height: u32,
        limits: &DeviceLimits,
    ) -> Result<[u32; 3], ThreadGroupError> {
        let grid = self.dispatch_grid(width, height);
        for (axis, groups) in [('x', grid[0]), ('y', grid[1])] {
            if groups > limits.max_dispatch_per_axis {
                return Err(ThreadGroupError::GridTooLarge {
                    axis,
                    groups,
                    max: limits.max_dispatch_per_axis,
                });
            }
        }
        Ok(grid)
    }
}

/// Compute capability limits of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    pub max_invocations: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub max_z: u32,
    pub max_dispatch_per_axis: u32,
}

impl DeviceLimits {
    /// DirectCompute 5.0 (DX11-class) limits.
    pub const DIRECT_COMPUTE_5_0: DeviceLimits = DeviceLimits {
        max_invocations: 1024,
        max_x: 1024,
        max_y: 1024,
        max_z: 64,
        max_dispatch_per_axis: 65535,
    };

    /// Limits reported by a wgpu device.
    pub fn from_wgpu(limits: &wgpu::Limits) -> Self {
        Self {
            max_invocations: limits.max_compute_invocations_per_workgroup,
            max_x: limits.max_compute_workgroup_size_x,
            max_y: limits.max_compute_workgroup_size_y,
            max_z: limits.max_compute_workgroup_size_z,
            max_dispatch_per_axis: limits.max_compute_workgroups_per_dimension,
        }
    }
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self::DIRECT_COMPUTE_5_0
    }
}

/// Work-group shape or grid that the device cannot run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThreadGroupError {
    #[error("Thread group {0:?} has a zero-sized axis")]
    ZeroAxis(GpuThreads),
    #[error("Thread group has {invocations} invocations, device allows {max}")]
    TooManyInvocations { invocations: u64, max: u32 },
    #[error("THREAD_{axis} is too large: {size} > {max}")]
    AxisTooLarge { axis: char, size: u32, max: u32 },
    #[error("Dispatch grid needs {groups} groups along {axis}, device allows {max}")]
    GridTooLarge { axis: char, groups: u32, max: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_dispatch_grid_exact_and_partial() {
        let threads = GpuThreads::new(8, 8, 1);
        assert_eq!(threads.dispatch_grid(64, 64), [8, 8, 1]);
        assert_eq!(threads.dispatch_grid(65, 1), [9, 1, 1]);
        assert_eq!(threads.dispatch_grid(800, 600), [100, 75, 1]);
    }

    #[test]
    fn test_validate_ok() {
        let limits = DeviceLimits::DIRECT_COMPUTE_5_0;
        assert!(GpuThreads::new(32, 32, 1).validate(&limits).is_ok());
        assert!(GpuThreads::new(1, 1, 64).validate(&limits).is_ok());
    }

    #[test]
    fn test_validate_too_many_invocations() {
        let limits = DeviceLimits::DIRECT_COMPUTE_5_0;
        let err = GpuThreads::new(64, 32, 1).validate(&limits).unwrap_err();
        assert!(matches!(
            err,
            ThreadGroupError::TooManyInvocations {
                invocations: 2048,
                ..
            }
        ));
    }

    #[test]
    fn test_validate_axis_limit() {
        let limits = DeviceLimits::DIRECT_COMPUTE_5_0;
        let err = GpuThreads::new(1, 1, 128).validate(&limits).unwrap_err();
        assert_eq!(
            err,
            ThreadGroupError::AxisTooLarge {
                axis: 'z',
                size: 128,
                max: 64
            }
        );
    }

    #[test]
    fn test_validate_zero_axis() {
        let limits = DeviceLimits::DIRECT_COMPUTE_5_0;
        assert!(matches!(
            GpuThreads::new(0, 8, 1).validate(&limits),
            Err(ThreadGroupError::ZeroAxis(_))
        ));
    }

    #[test]
    fn test_grid_too_large() {
        let limits = DeviceLimits {
            max_dispatch_per_axis: 4,
            ..DeviceLimits::DIRECT_COMPUTE_5_0
        };
        let threads = GpuThreads::new(8, 8, 1);
        assert!(threads.dispatch_grid_checked(32, 32, &limits).is_ok());
        assert!(matches!(
            threads.dispatch_grid_checked(33, 8, &limits),
            Err(ThreadGroupError::GridTooLarge { axis: 'x', groups: 5, .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_grid_covers_buffer(
            width in 1u32..=16384,
            height in 1u32..=16384,
            tx in 1u32..=32,
            ty in 1u32..=32,
        ) {
            let grid = GpuThreads::new(tx, ty, 1).dispatch_grid(width, height);
            prop_assert_eq!(grid[0], (width as f64 / tx as f64).ceil() as u32);
            prop_assert_eq!(grid[1], (height as f64 / ty as f64).ceil() as u32);
            prop_assert_eq!(grid[2], 1);
            // Covers every texel without a spare work-group.
            prop_assert!(grid[0] * tx >= width && (grid[0] - 1) * tx < width);
            prop_assert!(grid[1] * ty >= height && (grid[1] - 1) * ty < height);
        }
    }
}
