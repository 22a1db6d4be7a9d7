/// Options the collector is constructed with.
#[derive(Clone, Debug)]
pub struct Options {
    /// Whether cycle detection runs at all. When disabled every step is a
    /// plain sweep driven by raw refcounts.
    pub cycle_enabled: bool,

    /// Full marking scans per `Marking` step, `None` to run to the fixed point
    pub scans_per_step: Option<usize>,

    /// Let the host GC trace a promoted bridged object right away
    pub eager_host_trace: bool,

    /// Stop tracking immutable containers that only hold untracked objects
    pub untrack_atomic_containers: bool,
}

impl Default for Options {
    /// Create a new options struct with default values.
    fn default() -> Self {
        OptionsBuilder::new().build()
    }
}

pub struct OptionsBuilder(Options);

impl OptionsBuilder {
    /// Create new options with default values.
    pub fn new() -> Self {
        Self(Options {
            cycle_enabled: true,
            scans_per_step: None,
            eager_host_trace: true,
            untrack_atomic_containers: true,
        })
    }

    /// Return the options that have been built, consuming the builder.
    pub fn build(self) -> Options {
        self.0
    }

    pub fn cycle_enabled(mut self, cycle_enabled: bool) -> Self {
        self.0.cycle_enabled = cycle_enabled;
        self
    }

    pub fn scans_per_step(mut self, scans_per_step: Option<usize>) -> Self {
        self.0.scans_per_step = scans_per_step;
        self
    }

    pub fn eager_host_trace(mut self, eager_host_trace: bool) -> Self {
        self.0.eager_host_trace = eager_host_trace;
        self
    }

    pub fn untrack_atomic_containers(mut self, untrack_atomic_containers: bool) -> Self {
        self.0.untrack_atomic_containers = untrack_atomic_containers;
        self
    }
}
