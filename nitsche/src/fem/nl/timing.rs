use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

/// Time spent assembling one global quantity.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct AssemblyTimings {
    pub total: Duration,
    pub contact: Duration,
    pub standard: Duration,
}

impl AssemblyTimings {
    pub fn clear(&mut self) {
        self.total = Duration::new(0, 0);
        self.contact = Duration::new(0, 0);
        self.standard = Duration::new(0, 0);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct Timings {
    /// Deforming surfaces and rebuilding distance maps.
    pub geometry_update: Duration,
    pub packing: Duration,
    pub residual: AssemblyTimings,
    pub jacobian: AssemblyTimings,
    pub linear_solve: Duration,
    pub total: Duration,
}

impl Timings {
    pub fn clear(&mut self) {
        self.geometry_update = Duration::new(0, 0);
        self.packing = Duration::new(0, 0);
        self.residual.clear();
        self.jacobian.clear();
        self.linear_solve = Duration::new(0, 0);
        self.total = Duration::new(0, 0);
    }
}

impl Display for Timings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Timings (ms):")?;
        writeln!(
            f,
            "  Geometry update time:       {}",
            self.geometry_update.as_millis()
        )?;
        writeln!(f, "  Packing time:               {}", self.packing.as_millis())?;
        writeln!(
            f,
            "  Residual time:              {}",
            self.residual.total.as_millis()
        )?;
        writeln!(
            f,
            "    Contact time:             {}",
            self.residual.contact.as_millis()
        )?;
        writeln!(
            f,
            "    Standard form time:       {}",
            self.residual.standard.as_millis()
        )?;
        writeln!(
            f,
            "  Jacobian time:              {}",
            self.jacobian.total.as_millis()
        )?;
        writeln!(
            f,
            "    Contact time:             {}",
            self.jacobian.contact.as_millis()
        )?;
        writeln!(
            f,
            "    Standard form time:       {}",
            self.jacobian.standard.as_millis()
        )?;
        writeln!(
            f,
            "  Linear solve time:          {}",
            self.linear_solve.as_millis()
        )?;
        writeln!(f, "  Total solve time:           {}", self.total.as_millis())
    }
}

/// Adds the time elapsed since `t_begin` to `duration` and returns the current time.
pub(crate) fn add_time(duration: &mut Duration, t_begin: Instant) -> Instant {
    let t_end = Instant::now();
    *duration += t_end - t_begin;
    t_end
}
