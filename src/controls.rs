use parking_lot::RwLock;

use crate::light::ShadowFrustum;
use crate::shadow::SamplerFilter;

/// Frustum presets reachable from the keyboard: the far-reaching default
/// and a tight variant that shows off depth precision up close.
const FRUSTUM_PRESETS: [ShadowFrustum; 2] = [
    ShadowFrustum {
        near: 1.0,
        far: 500.0,
    },
    ShadowFrustum {
        near: 5.0,
        far: 100.0,
    },
];

/// Operator-facing runtime configuration, shared between the event loop
/// and the renderer.  The shading core never reads this directly; the
/// current values are passed down explicitly each frame.
#[derive(Debug)]
pub struct OperatorControls {
    state: RwLock<ControlState>,
}

#[derive(Debug, Clone, Copy)]
struct ControlState {
    filter: SamplerFilter,
    frustum: ShadowFrustum,
}

impl OperatorControls {
    pub fn new(filter: SamplerFilter, frustum: ShadowFrustum) -> Self {
        Self {
            state: RwLock::new(ControlState { filter, frustum }),
        }
    }

    pub fn filter(&self) -> SamplerFilter {
        self.state.read().filter
    }

    pub fn frustum(&self) -> ShadowFrustum {
        self.state.read().frustum
    }

    /// Advances to the next sampler filter and returns it.
    pub fn cycle_filter(&self) -> SamplerFilter {
        let mut state = self.state.write();
        state.filter = state.filter.cycle();
        state.filter
    }

    /// Advances to the next frustum preset and returns it.  A custom
    /// frustum (scene or CLI supplied) cycles into the first preset.
    pub fn cycle_frustum(&self) -> ShadowFrustum {
        let mut state = self.state.write();
        state.frustum = match FRUSTUM_PRESETS.iter().position(|p| *p == state.frustum) {
            Some(i) => FRUSTUM_PRESETS[(i + 1) % FRUSTUM_PRESETS.len()],
            None => FRUSTUM_PRESETS[0],
        };
        state.frustum
    }
}

impl Default for OperatorControls {
    fn default() -> Self {
        Self::new(SamplerFilter::default(), ShadowFrustum::default())
    }
}
