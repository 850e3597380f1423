/// Receiver of a 0–100 completion percentage.
pub trait ProgressSink {
    fn report(&mut self, percent: f64);
}

impl<F: FnMut(f64)> ProgressSink for F {
    fn report(&mut self, percent: f64) {
        self(percent)
    }
}

/// Discards every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _percent: f64) {}
}

/// Slice `[base, base + span]` of an outer 0–100 scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressBand {
    pub base: f64,
    pub span: f64,
}

impl ProgressBand {
    pub const fn new(base: f64, span: f64) -> Self {
        Self { base, span }
    }

    pub fn end(&self) -> f64 {
        self.base + self.span
    }

    /// Position on the outer scale for an inner percentage.
    pub fn map(&self, inner: f64) -> f64 {
        self.base + inner * self.span / 100.0
    }

    /// Wrap `outer` so that inner 0–100 reports land inside this band.
    pub fn scope<'a>(&self, outer: &'a mut dyn ProgressSink) -> BandedProgress<'a> {
        BandedProgress { band: *self, outer }
    }
}

/// Forwards inner reports to an outer sink, remapped into a band.
pub struct BandedProgress<'a> {
    band: ProgressBand,
    outer: &'a mut dyn ProgressSink,
}

impl ProgressSink for BandedProgress<'_> {
    fn report(&mut self, percent: f64) {
        self.outer.report(self.band.map(percent));
    }
}
