pub mod font;
pub mod output;
pub mod visualization;

use std::{
    fmt,
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::{Region, Size, analysis::round2, error::Result};

/// Below this overall percentage a run passes.
pub const PASS_LIMIT: f64 = 5.0;
/// At or above this overall percentage a run fails.
pub const FAIL_LIMIT: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Review,
    Fail,
}

impl Verdict {
    pub fn from_percentage(percentage: f64) -> Self {
        match percentage {
            p if p < PASS_LIMIT => Verdict::Pass,
            p if p < FAIL_LIMIT => Verdict::Review,
            _ => Verdict::Fail,
        }
    }

    /// Only a pass maps to a successful exit status.
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Review => "REVIEW",
            Verdict::Fail => "FAIL",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputPaths {
    pub overlay: PathBuf,
    pub diff_highlight: PathBuf,
    pub comparison: PathBuf,
    #[serde(skip)]
    pub report: PathBuf,
}

impl OutputPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            overlay: dir.join("overlay.png"),
            diff_highlight: dir.join("diff_highlight.png"),
            comparison: dir.join("comparison.png"),
            report: dir.join("report.json"),
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.report.parent()
    }
}

/// Outcome of one comparison run. Built once by [`ReportBuilder`].
///
/// `impl_size` is the implementation screenshot as captured, before it was
/// resized to `design_size` for comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    design_size: Size,
    /// Implementation size before alignment.
    impl_size: Size,
    threshold: u8,
    overall_diff_percentage: f64,
    diff_regions: Vec<Region>,
    outputs: OutputPaths,
    verdict: Verdict,
}

impl Report {
    pub fn design_size(&self) -> Size {
        self.design_size
    }

    /// Size of the implementation as loaded, not the aligned size.
    pub fn impl_size(&self) -> Size {
        self.impl_size
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn overall_diff_percentage(&self) -> f64 {
        self.overall_diff_percentage
    }

    pub fn diff_regions(&self) -> &[Region] {
        &self.diff_regions
    }

    pub fn outputs(&self) -> &OutputPaths {
        &self.outputs
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable summary, the same text as the `Display` output.
    pub fn summary(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(50);

        writeln!(f, "{rule}")?;
        writeln!(f, "Visual diff report")?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Design size:     {}", self.design_size)?;
        writeln!(f, "Implementation:  {}", self.impl_size)?;
        writeln!(f, "Threshold:       {}", self.threshold)?;
        writeln!(f, "Overall diff:    {:.2}%", self.overall_diff_percentage)?;
        writeln!(f, "Verdict:         {}", self.verdict)?;
        writeln!(f)?;
        writeln!(f, "Outputs:")?;
        writeln!(f, "  overlay:        {}", self.outputs.overlay.display())?;
        writeln!(f, "  diff highlight: {}", self.outputs.diff_highlight.display())?;
        writeln!(f, "  comparison:     {}", self.outputs.comparison.display())?;
        writeln!(f, "  report:         {}", self.outputs.report.display())?;

        if !self.diff_regions.is_empty() {
            writeln!(f)?;
            writeln!(f, "Diff regions (top 5):")?;
            for region in self.diff_regions.iter().take(5) {
                writeln!(f, "  - {}: {:.1}%", region.label, region.diff_percentage)?;
            }
        }

        Ok(())
    }
}

pub struct ReportBuilder {
    design_size: Size,
    impl_size: Size,
    threshold: u8,
    overall_diff: f64,
    regions: Vec<Region>,
    outputs: Option<OutputPaths>,
}

impl ReportBuilder {
    pub fn new(design_size: Size, impl_size: Size) -> Self {
        Self {
            design_size,
            impl_size,
            threshold: crate::DEFAULT_THRESHOLD as u8,
            overall_diff: 0.0,
            regions: Vec::new(),
            outputs: None,
        }
    }

    pub fn threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    /// Unrounded overall percentage; the verdict is classified from this value.
    pub fn overall_diff(mut self, percentage: f64) -> Self {
        self.overall_diff = percentage;
        self
    }

    pub fn regions(mut self, regions: Vec<Region>) -> Self {
        self.regions = regions;
        self
    }

    pub fn outputs(mut self, outputs: OutputPaths) -> Self {
        self.outputs = Some(outputs);
        self
    }

    pub fn build(self) -> Report {
        let mut diff_regions = self.regions;
        diff_regions.sort_by(|a, b| b.diff_percentage.total_cmp(&a.diff_percentage));

        Report {
            design_size: self.design_size,
            impl_size: self.impl_size,
            threshold: self.threshold,
            overall_diff_percentage: round2(self.overall_diff),
            diff_regions,
            outputs: self
                .outputs
                .unwrap_or_else(|| OutputPaths::in_dir(Path::new("."))),
            verdict: Verdict::from_percentage(self.overall_diff),
        }
    }
}
