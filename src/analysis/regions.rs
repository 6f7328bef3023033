use log::debug;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::Deserialize;

use crate::{
    DEFAULT_GRID_SIZE, DEFAULT_REGION_CUTOFF, Region,
    analysis::{pixel_diff::DifferenceMask, round2},
    error::{Result, VisualDiffError},
};

/// How grid cells treat pixels left over when the image size is not a
/// multiple of the grid size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridTiling {
    /// Every cell is `floor(size / grid)` wide; trailing pixels are not
    /// analysed (they still count towards the overall percentage).
    #[default]
    Truncate,
    /// The last row and column of cells extend to the image edge.
    AbsorbRemainder,
}

#[derive(Debug, Clone, Copy)]
struct Cell {
    row: u32,
    col: u32,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

pub struct RegionAnalyzer {
    grid_size: u32,
    cutoff: f64,
    tiling: GridTiling,
    parallel: bool,
}

impl RegionAnalyzer {
    pub fn new(grid_size: u32, cutoff: f64) -> Result<Self> {
        if grid_size == 0 {
            return Err(VisualDiffError::InvalidParameter(
                "Grid size must be at least 1".into(),
            ));
        }
        if !(0.0..=100.0).contains(&cutoff) {
            return Err(VisualDiffError::InvalidParameter(format!(
                "Region cutoff must be between 0 and 100, got {cutoff}"
            )));
        }

        Ok(Self {
            grid_size,
            cutoff,
            tiling: GridTiling::Truncate,
            parallel: true,
        })
    }

    pub fn with_tiling(mut self, tiling: GridTiling) -> Self {
        self.tiling = tiling;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Regions whose local diff ratio exceeds the cutoff, highest first.
    /// Ties keep row-major order.
    pub fn analyze(&self, mask: &DifferenceMask) -> Vec<Region> {
        let cells = self.cells(mask.width(), mask.height());

        let mut regions: Vec<Region> = if self.parallel {
            cells
                .par_iter()
                .map(|cell| self.measure(mask, cell))
                .collect::<Vec<_>>()
                .into_iter()
                .flatten()
                .collect()
        } else {
            cells.iter().filter_map(|cell| self.measure(mask, cell)).collect()
        };

        regions.sort_by(|a, b| b.diff_percentage.total_cmp(&a.diff_percentage));
        debug!(
            "{} of {} grid cells exceed {}%",
            regions.len(),
            cells.len(),
            self.cutoff
        );

        regions
    }

    fn cells(&self, width: u32, height: u32) -> Vec<Cell> {
        let n = self.grid_size;
        let cell_w = width / n;
        let cell_h = height / n;
        let mut cells = Vec::with_capacity((n * n) as usize);

        for row in 0..n {
            for col in 0..n {
                let x = col * cell_w;
                let y = row * cell_h;
                let (w, h) = match self.tiling {
                    GridTiling::Truncate => (cell_w, cell_h),
                    GridTiling::AbsorbRemainder => (
                        if col == n - 1 { width - x } else { cell_w },
                        if row == n - 1 { height - y } else { cell_h },
                    ),
                };
                cells.push(Cell { row, col, x, y, width: w, height: h });
            }
        }

        cells
    }

    fn measure(&self, mask: &DifferenceMask, cell: &Cell) -> Option<Region> {
        let area = cell.width as usize * cell.height as usize;
        if area == 0 {
            return None;
        }

        let changed = mask.count_in(cell.x, cell.y, cell.x + cell.width, cell.y + cell.height);
        let pct = changed as f64 / area as f64 * 100.0;

        (pct > self.cutoff).then(|| Region {
            label: format!("row{}_col{}", cell.row + 1, cell.col + 1),
            x: cell.x,
            y: cell.y,
            width: cell.width,
            height: cell.height,
            diff_percentage: round2(pct),
        })
    }
}

impl Default for RegionAnalyzer {
    fn default() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
            cutoff: DEFAULT_REGION_CUTOFF,
            tiling: GridTiling::Truncate,
            parallel: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_left_half_reported_right_half_absent() {
        let mask = DifferenceMask::from_fn(100, 100, |x, _| x < 50);
        let regions = RegionAnalyzer::default().analyze(&mask);

        // columns 1 and 2 span x in [0, 50)
        assert_eq!(regions.len(), 8);
        for region in &regions {
            assert_eq!(region.diff_percentage, 100.0);
            assert!(region.label.ends_with("_col1") || region.label.ends_with("_col2"));
        }
        assert_eq!(regions[0].label, "row1_col1");
        assert_eq!(regions[1].label, "row1_col2");
        assert_eq!(regions[7].label, "row4_col2");
    }

    #[test]
    fn test_sorted_descending_with_cutoff() {
        // row 1 col 1: full; row 2 col 3: partially changed; rest clean
        let mask = DifferenceMask::from_fn(40, 40, |x, y| {
            (x < 10 && y < 10) || ((20..30).contains(&x) && (10..20).contains(&y) && x < 22)
        });
        let regions = RegionAnalyzer::default().analyze(&mask);

        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].label, "row1_col1");
        assert_eq!(regions[0].diff_percentage, 100.0);
        assert_eq!(regions[1].label, "row2_col3");
        assert_eq!(regions[1].diff_percentage, 20.0);
        assert_eq!((regions[1].x, regions[1].y), (20, 10));
    }

    #[test]
    fn test_cutoff_is_exclusive() {
        // exactly 5 of 100 pixels in the first cell
        let mask = DifferenceMask::from_fn(40, 40, |x, y| y == 0 && x < 5);
        assert!(RegionAnalyzer::default().analyze(&mask).is_empty());

        let mask = DifferenceMask::from_fn(40, 40, |x, y| y == 0 && x < 6);
        assert_eq!(RegionAnalyzer::default().analyze(&mask).len(), 1);
    }

    #[test]
    fn test_at_most_sixteen_regions() {
        let mask = DifferenceMask::from_fn(64, 48, |_, _| true);
        let regions = RegionAnalyzer::default().analyze(&mask);
        assert_eq!(regions.len(), 16);
        for region in regions {
            assert!(region.x + region.width <= 64);
            assert!(region.y + region.height <= 48);
        }
    }

    #[test]
    fn test_truncate_excludes_trailing_pixels() {
        // 10x10: cells are 2x2, pixels in the last two rows/columns are ignored
        let mask = DifferenceMask::from_fn(10, 10, |x, y| x >= 8 || y >= 8);
        assert!(RegionAnalyzer::default().analyze(&mask).is_empty());
    }

    #[test]
    fn test_absorb_remainder_covers_edges() {
        let mask = DifferenceMask::from_fn(10, 10, |x, y| x >= 8 || y >= 8);
        let regions = RegionAnalyzer::default()
            .with_tiling(GridTiling::AbsorbRemainder)
            .analyze(&mask);

        assert!(!regions.is_empty());
        let corner = regions.iter().find(|r| r.label == "row4_col4").unwrap();
        assert_eq!((corner.x, corner.y, corner.width, corner.height), (6, 6, 4, 4));
        for region in &regions {
            assert!(region.x + region.width <= 10);
            assert!(region.y + region.height <= 10);
        }
    }

    #[test]
    fn test_tiny_image_has_no_cells() {
        let mask = DifferenceMask::from_fn(3, 3, |_, _| true);
        assert!(RegionAnalyzer::default().analyze(&mask).is_empty());
    }

    #[test]
    fn test_custom_grid() {
        let mask = DifferenceMask::from_fn(20, 20, |x, _| x < 10);
        let regions = RegionAnalyzer::new(2, 5.0).unwrap().analyze(&mask);
        let labels: Vec<_> = regions.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["row1_col1", "row2_col1"]);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mask = DifferenceMask::from_fn(57, 43, |x, y| (x * 7 + y * 3) % 5 == 0 || x > 40);
        let par = RegionAnalyzer::default().analyze(&mask);
        let seq = RegionAnalyzer::default().with_parallel(false).analyze(&mask);
        assert_eq!(par, seq);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(RegionAnalyzer::new(0, 5.0).is_err());
        assert!(RegionAnalyzer::new(4, 101.0).is_err());
        assert!(RegionAnalyzer::new(4, -1.0).is_err());
    }
}
