//! Simulation controller - the Init/Step/Display state machine.

use log::info;

use super::{
    BufferExchange, BufferRole, ComputeProgram, Dispatcher, FilterMode, GridBuffer, GridBuffers,
    INIT_MAP, KernelHandle, PixelFormat, SimulationError, bind_display, bind_domain,
    bind_parameters,
};
use crate::schema::{Color, DisplayMode, InitMap, SimulationConfig, SimulationParameters};

/// Controller lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No Init has run; Step and Refresh are rejected.
    Uninitialized,
    /// Current holds a valid state.
    Ready,
}

/// Settings the grid buffers are allocated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferSettings {
    pub format: PixelFormat,
    pub filter: FilterMode,
    pub exchange: BufferExchange,
}

impl BufferSettings {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            format: config.pixel_format,
            filter: config.filter_mode,
            exchange: config.buffer_exchange,
        }
    }
}

/// Everything the Display kernel reads besides Current.
#[derive(Debug, Clone, Copy, PartialEq)]
struct DisplaySettings {
    mode: DisplayMode,
    color_a: Color,
    color_b: Color,
}

impl DisplaySettings {
    fn of(params: &SimulationParameters) -> Self {
        Self {
            mode: params.display_mode,
            color_a: params.color_a,
            color_b: params.color_b,
        }
    }
}

/// Drives a compute program through Init, Step and Display.
///
/// Parameters are passed to every operation and never modified. All work is
/// submitted in order to the program; nothing here waits on completion.
pub struct Simulation<P: ComputeProgram> {
    program: P,
    dispatcher: Dispatcher,
    buffers: GridBuffers<P::Texture>,
    init_map: P::Texture,
    settings: BufferSettings,
    phase: Phase,
    steps: u64,
    display_stale: bool,
    displayed: Option<DisplaySettings>,
}

impl<P: ComputeProgram> Simulation<P> {
    /// Wrap `program`, uploading the initial-state image.
    ///
    /// Kernel group sizes are queried here, once. Grid buffers are allocated
    /// lazily by the first [`Simulation::init`].
    pub fn new(mut program: P, init_map: &InitMap, settings: BufferSettings) -> Result<Self, SimulationError> {
        let dispatcher = Dispatcher::new(&program)?;
        let init_map = program.upload_image(init_map)?;

        Ok(Self {
            program,
            dispatcher,
            buffers: GridBuffers::default(),
            init_map,
            settings,
            phase: Phase::Uninitialized,
            steps: 0,
            display_stale: false,
            displayed: None,
        })
    }

    /// Seed Current from the initial-state image.
    ///
    /// Allocates the grid buffers on first use or when the domain size
    /// changed; otherwise the existing buffers are reused.
    pub fn init(&mut self, params: &SimulationParameters) -> Result<(), SimulationError> {
        let (width, height) = params.extent();
        let allocated = self.buffers.ensure_all(
            &mut self.program,
            width,
            height,
            self.settings.format,
            self.settings.filter,
        )?;

        bind_domain(&mut self.program, params);
        self.program
            .set_texture(KernelHandle::Init, INIT_MAP, &self.init_map)?;
        self.bind_buffer(KernelHandle::Init, BufferRole::Current)?;
        self.dispatcher
            .dispatch_2d(&mut self.program, KernelHandle::Init, width, height)?;

        info!("initialized {width}x{height} domain ({allocated} buffers allocated)");
        self.phase = Phase::Ready;
        self.steps = 0;
        self.display_stale = true;
        Ok(())
    }

    /// Re-run Init; identical to [`Simulation::init`].
    pub fn reset(&mut self, params: &SimulationParameters) -> Result<(), SimulationError> {
        self.init(params)
    }

    /// Advance the simulation by one step.
    pub fn step(&mut self, params: &SimulationParameters) -> Result<(), SimulationError> {
        self.ensure_geometry(params)?;
        let (width, height) = params.extent();

        bind_parameters(&mut self.program, params);
        self.bind_buffer(KernelHandle::Step, BufferRole::Current)?;
        self.bind_buffer(KernelHandle::Step, BufferRole::Next)?;
        self.dispatcher
            .dispatch_2d(&mut self.program, KernelHandle::Step, width, height)?;

        match self.settings.exchange {
            BufferExchange::Copy => {
                let next = self.buffers.next.texture_or_err()?;
                let current = self.buffers.current.texture_or_err()?;
                self.program.copy_texture(next, current)?;
            }
            BufferExchange::Swap => self.buffers.swap_current_next(),
        }

        self.steps += 1;
        self.display_stale = true;
        Ok(())
    }

    /// Run `count` steps back to back.
    pub fn run(&mut self, params: &SimulationParameters, count: u32) -> Result<(), SimulationError> {
        for _ in 0..count {
            self.step(params)?;
        }
        Ok(())
    }

    /// Render Current into the Display buffer using the active display mode.
    pub fn refresh(&mut self, params: &SimulationParameters) -> Result<(), SimulationError> {
        self.ensure_geometry(params)?;
        let (width, height) = params.extent();

        bind_display(&mut self.program, params);
        self.bind_buffer(KernelHandle::Display, BufferRole::Current)?;
        self.bind_buffer(KernelHandle::Display, BufferRole::Display)?;
        self.dispatcher
            .dispatch_2d(&mut self.program, KernelHandle::Display, width, height)?;

        self.display_stale = false;
        self.displayed = Some(DisplaySettings::of(params));
        Ok(())
    }

    /// Whether Display lags behind Current or the requested display settings.
    ///
    /// A mode or palette change counts even when no step ran, so a paused
    /// simulation still shows what the user selected.
    pub fn needs_refresh(&self, params: &SimulationParameters) -> bool {
        self.phase == Phase::Ready
            && (self.display_stale || self.displayed != Some(DisplaySettings::of(params)))
    }

    /// Read back every pixel of a grid buffer. Blocks until queued work is done.
    pub fn read_buffer(&self, role: BufferRole) -> Result<Vec<[f32; 4]>, SimulationError> {
        let texture = self.buffers.get(role).texture_or_err()?;
        self.program.read_texture(texture)
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Steps taken since the last Init.
    #[inline]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    #[inline]
    pub fn settings(&self) -> BufferSettings {
        self.settings
    }

    /// The buffer presented to the user.
    #[inline]
    pub fn display(&self) -> &GridBuffer<P::Texture> {
        &self.buffers.display
    }

    #[inline]
    pub fn buffers(&self) -> &GridBuffers<P::Texture> {
        &self.buffers
    }

    #[inline]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    #[inline]
    pub fn program(&self) -> &P {
        &self.program
    }

    fn bind_buffer(&mut self, kernel: KernelHandle, role: BufferRole) -> Result<(), SimulationError> {
        let buffer = self.buffers.get(role);
        self.program
            .set_texture(kernel, buffer.name(), buffer.texture_or_err()?)
    }

    /// Reject use before Init; re-run Init if the domain size changed.
    fn ensure_geometry(&mut self, params: &SimulationParameters) -> Result<(), SimulationError> {
        if self.phase == Phase::Uninitialized {
            return Err(SimulationError::Uninitialized);
        }
        if self.buffers.extent() != Some(params.extent()) {
            info!(
                "domain changed from {:?} to {:?}, re-initializing",
                self.buffers.extent(),
                params.extent()
            );
            self.init(params)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{CpuProgram, GroupCount, WorkgroupSize};
    use crate::schema::Seed;

    fn params(width: u32, height: u32) -> SimulationParameters {
        SimulationParameters {
            width,
            height,
            ..Default::default()
        }
    }

    fn simulation(p: &SimulationParameters, settings: BufferSettings) -> Simulation<CpuProgram> {
        let init_map = Seed::default().generate(p.width, p.height);
        Simulation::new(CpuProgram::new(), &init_map, settings).unwrap()
    }

    fn ready(p: &SimulationParameters) -> Simulation<CpuProgram> {
        let mut sim = simulation(p, BufferSettings::default());
        sim.init(p).unwrap();
        sim
    }

    #[test]
    fn test_step_and_refresh_require_init() {
        let p = params(16, 16);
        let mut sim = simulation(&p, BufferSettings::default());

        assert_eq!(sim.phase(), Phase::Uninitialized);
        assert!(matches!(sim.step(&p), Err(SimulationError::Uninitialized)));
        assert!(matches!(sim.refresh(&p), Err(SimulationError::Uninitialized)));
        assert!(!sim.needs_refresh(&p));
        assert!(sim.program().dispatch_log().is_empty());
        // Buffers are lazy
        assert_eq!(sim.program().allocations(), 0);
    }

    #[test]
    fn test_init_dispatch_sizes() {
        let p = params(256, 256);
        let sim = ready(&p);
        assert_eq!(sim.phase(), Phase::Ready);
        assert_eq!(
            sim.program().dispatch_log().back().unwrap().groups,
            GroupCount { x: 32, y: 32, z: 1 }
        );

        let p = params(257, 256);
        let sim = ready(&p);
        let last = sim.program().dispatch_log().back().unwrap();
        assert_eq!(last.kernel, KernelHandle::Init);
        assert_eq!(last.groups, GroupCount { x: 33, y: 32, z: 1 });
    }

    #[test]
    fn test_kernel_order_and_binding() {
        let p = params(16, 16);
        let mut sim = ready(&p);
        sim.step(&p).unwrap();
        sim.refresh(&p).unwrap();

        let kernels: Vec<KernelHandle> =
            sim.program().dispatch_log().iter().map(|d| d.kernel).collect();
        assert_eq!(
            kernels,
            vec![KernelHandle::Init, KernelHandle::Step, KernelHandle::Display]
        );
        assert_eq!(sim.display().name(), "DisplayMap");
        assert_eq!(sim.steps(), 1);
    }

    #[test]
    fn test_reset_reuses_buffers() {
        let p = params(32, 32);
        let mut sim = ready(&p);
        assert_eq!(sim.program().allocations(), 3);

        sim.run(&p, 3).unwrap();
        sim.reset(&p).unwrap();
        assert_eq!(sim.program().allocations(), 3);
        assert_eq!(sim.steps(), 0);
    }

    #[test]
    fn test_first_colored_refresh_uses_palette() {
        let p = params(16, 16);
        assert_eq!(p.display_mode, DisplayMode::Colored);
        let mut sim = ready(&p);
        sim.refresh(&p).unwrap();

        let current = sim.read_buffer(BufferRole::Current).unwrap();
        let display = sim.read_buffer(BufferRole::Display).unwrap();
        let (color_a, color_b) = (p.color_a.to_array(), p.color_b.to_array());
        for (shown, cell) in display.iter().zip(current.iter()) {
            let t = (cell[0] - cell[1]).clamp(0.0, 1.0);
            let expected: [f32; 4] =
                std::array::from_fn(|i| color_b[i] * (1.0 - t) + color_a[i] * t);
            assert_eq!(*shown, expected);
        }
        assert_eq!(display[0][3], 1.0);
    }

    #[test]
    fn test_palette_change_while_paused_refreshes() {
        let mut p = params(16, 16);
        let mut sim = ready(&p);
        sim.refresh(&p).unwrap();
        let before = sim.read_buffer(BufferRole::Display).unwrap();
        assert!(!sim.needs_refresh(&p));

        p.color_a = Color::rgb(1.0, 0.0, 0.0);
        assert!(sim.needs_refresh(&p));
        sim.refresh(&p).unwrap();
        assert!(!sim.needs_refresh(&p));
        assert_ne!(sim.read_buffer(BufferRole::Display).unwrap(), before);
        assert_eq!(sim.steps(), 0);
    }

    #[test]
    fn test_reset_reproduces_first_display() {
        let p = params(32, 32);
        let mut sim = ready(&p);
        sim.refresh(&p).unwrap();
        let first = sim.read_buffer(BufferRole::Display).unwrap();

        sim.run(&p, 5).unwrap();
        sim.refresh(&p).unwrap();
        assert_ne!(sim.read_buffer(BufferRole::Display).unwrap(), first);

        sim.reset(&p).unwrap();
        sim.refresh(&p).unwrap();
        assert_eq!(sim.read_buffer(BufferRole::Display).unwrap(), first);
    }

    #[test]
    fn test_step_is_deterministic() {
        let p = params(24, 24);
        let mut sim = ready(&p);

        sim.step(&p).unwrap();
        let first = sim.read_buffer(BufferRole::Next).unwrap();

        sim.reset(&p).unwrap();
        sim.step(&p).unwrap();
        assert_eq!(sim.read_buffer(BufferRole::Next).unwrap(), first);

        let mut other = ready(&p);
        other.step(&p).unwrap();
        assert_eq!(other.read_buffer(BufferRole::Next).unwrap(), first);
    }

    #[test]
    fn test_copy_leaves_current_equal_to_next() {
        let p = params(16, 16);
        let mut sim = ready(&p);
        let before = sim.read_buffer(BufferRole::Current).unwrap();
        sim.step(&p).unwrap();

        let current = sim.read_buffer(BufferRole::Current).unwrap();
        assert_eq!(current, sim.read_buffer(BufferRole::Next).unwrap());
        assert_ne!(current, before);
    }

    #[test]
    fn test_display_reflects_exact_step_count() {
        let p = SimulationParameters {
            display_mode: DisplayMode::RawChannelsAB,
            ..params(24, 24)
        };

        let displayed_after = |steps: u32| {
            let mut sim = ready(&p);
            sim.run(&p, steps).unwrap();
            sim.refresh(&p).unwrap();
            (
                sim.read_buffer(BufferRole::Display).unwrap(),
                sim.read_buffer(BufferRole::Current).unwrap(),
            )
        };

        let (display, current) = displayed_after(4);
        let (earlier, _) = displayed_after(3);
        assert_ne!(display, earlier);

        // Raw mode shows A and B of the state after exactly four steps
        for (shown, cell) in display.iter().zip(current.iter()) {
            assert_eq!(*shown, [cell[0], cell[1], 0.0, 1.0]);
        }
    }

    #[test]
    fn test_display_mode_change_touches_only_display() {
        let mut p = params(24, 24);
        let mut sim = ready(&p);
        sim.run(&p, 3).unwrap();
        sim.refresh(&p).unwrap();

        let current = sim.read_buffer(BufferRole::Current).unwrap();
        let next = sim.read_buffer(BufferRole::Next).unwrap();
        let colored = sim.read_buffer(BufferRole::Display).unwrap();

        p.display_mode = DisplayMode::Greyscale;
        assert!(sim.needs_refresh(&p));
        sim.refresh(&p).unwrap();

        assert_ne!(sim.read_buffer(BufferRole::Display).unwrap(), colored);
        assert_eq!(sim.read_buffer(BufferRole::Current).unwrap(), current);
        assert_eq!(sim.read_buffer(BufferRole::Next).unwrap(), next);
        assert_eq!(sim.steps(), 3);
    }

    #[test]
    fn test_needs_refresh_tracking() {
        let p = params(16, 16);
        let mut sim = ready(&p);
        assert!(sim.needs_refresh(&p));

        sim.refresh(&p).unwrap();
        assert!(!sim.needs_refresh(&p));

        sim.step(&p).unwrap();
        assert!(sim.needs_refresh(&p));
        sim.refresh(&p).unwrap();

        sim.reset(&p).unwrap();
        assert!(sim.needs_refresh(&p));
    }

    #[test]
    fn test_swap_matches_copy() {
        let p = params(20, 20);
        let swap = BufferSettings {
            exchange: BufferExchange::Swap,
            ..Default::default()
        };

        let mut copied = ready(&p);
        let mut swapped = simulation(&p, swap);
        swapped.init(&p).unwrap();

        for _ in 0..5 {
            copied.step(&p).unwrap();
            swapped.step(&p).unwrap();
        }
        copied.refresh(&p).unwrap();
        swapped.refresh(&p).unwrap();

        assert_eq!(
            copied.read_buffer(BufferRole::Current).unwrap(),
            swapped.read_buffer(BufferRole::Current).unwrap()
        );
        assert_eq!(
            copied.read_buffer(BufferRole::Display).unwrap(),
            swapped.read_buffer(BufferRole::Display).unwrap()
        );
        assert_eq!(swapped.buffers().current.name(), "Map");
    }

    #[test]
    fn test_geometry_change_reinitializes() {
        let p = params(16, 16);
        let mut sim = ready(&p);
        sim.run(&p, 2).unwrap();

        let larger = params(24, 16);
        sim.step(&larger).unwrap();

        assert_eq!(sim.buffers().extent(), Some((24, 16)));
        assert_eq!(sim.program().allocations(), 6);
        assert_eq!(sim.steps(), 1);

        let kernels: Vec<KernelHandle> =
            sim.program().dispatch_log().iter().map(|d| d.kernel).collect();
        assert_eq!(
            &kernels[kernels.len() - 2..],
            &[KernelHandle::Init, KernelHandle::Step]
        );
    }

    #[test]
    fn test_allocation_failure_is_fatal() {
        let p = params(16, 16);
        let mut sim = simulation(&p, BufferSettings::default());
        let broken = params(0, 16);
        assert!(matches!(
            sim.init(&broken),
            Err(SimulationError::Allocation { .. })
        ));
        assert_eq!(sim.phase(), Phase::Uninitialized);
    }

    #[test]
    fn test_malformed_program_rejected() {
        let init_map = Seed::default().generate(16, 16);
        let program = CpuProgram::with_group_size(WorkgroupSize::new(0, 8, 1));
        assert!(matches!(
            Simulation::new(program, &init_map, BufferSettings::default()),
            Err(SimulationError::InvalidGroupSize { .. })
        ));
    }
}
