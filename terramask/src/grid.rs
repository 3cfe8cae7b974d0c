//! Canonical in-memory elevation grids and bilinear interpolation.
//!
//! Every tile, whatever its source format, ends up as an [`ElevationGrid`]:
//! a square matrix of signed 16-bit posts stored column-major, with column 0
//! on the western edge and row 0 on the southern edge.

use crate::error::{Result, TerrainError};

/// Sentinel marking a void, ocean or otherwise missing post.
pub const NO_DATA: i16 = -32767;

/// [`NO_DATA`] as returned by floating-point queries.
pub const NO_DATA_F64: f64 = NO_DATA as f64;

/// Fewest posts per side a grid can have and still be interpolated.
pub const MIN_POSTS: usize = 2;

/// Most posts per side of any supported format (DTED2, SRTM1).
pub const MAX_POSTS: usize = 3601;

/// Check a posts-per-side value against [`MIN_POSTS`]..=[`MAX_POSTS`].
pub fn check_posts(posts: usize) -> Result<()> {
    if (MIN_POSTS..=MAX_POSTS).contains(&posts) {
        Ok(())
    } else {
        Err(TerrainError::InvalidParameter {
            name: "posts",
            reason: format!("{} is outside {}..={}", posts, MIN_POSTS, MAX_POSTS),
        })
    }
}

/// Offsets closer than this (in post units) to a whole post snap onto it.
const POST_SNAP_EPSILON: f64 = 1e-9;

/// Read access to a square south-up grid of posts.
///
/// Implemented by the in-memory [`ElevationGrid`] and by memory-mapped HGT
/// tiles, so both share one interpolation rule.
pub trait PostGrid {
    /// Number of posts per side.
    fn posts(&self) -> usize;

    /// Post at `col` (0 = west) and `row` (0 = south).
    fn post(&self, col: usize, row: usize) -> i16;

    /// Bilinearly interpolate at a fractional position inside the tile.
    ///
    /// `fx` runs west to east and `fy` south to north, both in `0..=1`.
    /// When any of the four surrounding posts is [`NO_DATA`] the first valid
    /// corner in the order SW, SE, NW, NE is returned instead, or
    /// [`NO_DATA_F64`] if none is valid.
    fn interpolate(&self, fx: f64, fy: f64) -> f64 {
        let max_index = (self.posts() - 1) as f64;
        let x = snap(fx.clamp(0.0, 1.0) * max_index);
        let y = snap(fy.clamp(0.0, 1.0) * max_index);

        let last = self.posts() - 1;
        let x0 = (x.floor() as usize).min(last);
        let y0 = (y.floor() as usize).min(last);
        let x1 = (x0 + 1).min(last);
        let y1 = (y0 + 1).min(last);

        let sw = self.post(x0, y0);
        let se = self.post(x1, y0);
        let nw = self.post(x0, y1);
        let ne = self.post(x1, y1);

        let corners = [sw, se, nw, ne];
        if corners.contains(&NO_DATA) {
            return corners
                .iter()
                .find(|&&v| v != NO_DATA)
                .map(|&v| v as f64)
                .unwrap_or(NO_DATA_F64);
        }

        let tx = x - x0 as f64;
        let ty = y - y0 as f64;

        let south = sw as f64 * (1.0 - tx) + se as f64 * tx;
        let north = nw as f64 * (1.0 - tx) + ne as f64 * tx;
        south * (1.0 - ty) + north * ty
    }
}

fn snap(v: f64) -> f64 {
    let rounded = v.round();
    if (v - rounded).abs() < POST_SNAP_EPSILON {
        rounded
    } else {
        v
    }
}

/// An owned, immutable square grid of elevation posts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElevationGrid {
    posts: usize,
    /// Column-major: `data[col * posts + row]`.
    data: Vec<i16>,
}

impl ElevationGrid {
    /// Wrap column-major post data.
    ///
    /// # Errors
    ///
    /// Returns [`TerrainError::InvalidParameter`] for an unsupported post
    /// count and [`TerrainError::InvalidFileSize`] if `data` doesn't hold
    /// exactly `posts * posts` values.
    pub fn from_columns(posts: usize, data: Vec<i16>) -> Result<Self> {
        check_posts(posts)?;
        if data.len() != posts * posts {
            return Err(TerrainError::InvalidFileSize {
                size: data.len() * 2,
                expected: format!("{} posts of {}x{}", posts * posts, posts, posts),
            });
        }
        Ok(Self { posts, data })
    }

    /// A grid with every post set to `value`.
    pub fn filled(posts: usize, value: i16) -> Result<Self> {
        check_posts(posts)?;
        Ok(Self {
            posts,
            data: vec![value; posts * posts],
        })
    }

    /// Build a grid by evaluating `f(col, row)` for every post.
    pub fn from_fn(posts: usize, mut f: impl FnMut(usize, usize) -> i16) -> Result<Self> {
        check_posts(posts)?;
        let mut data = Vec::with_capacity(posts * posts);
        for col in 0..posts {
            for row in 0..posts {
                data.push(f(col, row));
            }
        }
        Ok(Self { posts, data })
    }

    /// Column-major post data.
    pub fn as_slice(&self) -> &[i16] {
        &self.data
    }

    /// Posts of one column, south to north.
    pub fn column(&self, col: usize) -> &[i16] {
        &self.data[col * self.posts..(col + 1) * self.posts]
    }

    /// Minimum and maximum valid posts, or `None` if every post is void.
    pub fn elevation_range(&self) -> Option<(i16, i16)> {
        self.data
            .iter()
            .filter(|&&v| v != NO_DATA)
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Number of [`NO_DATA`] posts.
    pub fn void_count(&self) -> usize {
        self.data.iter().filter(|&&v| v == NO_DATA).count()
    }
}

impl PostGrid for ElevationGrid {
    fn posts(&self) -> usize {
        self.posts
    }

    #[inline]
    fn post(&self, col: usize, row: usize) -> i16 {
        self.data[col * self.posts + row]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(posts: usize) -> ElevationGrid {
        ElevationGrid::from_fn(posts, |col, row| (col * 10 + row) as i16).unwrap()
    }

    #[test]
    fn test_from_columns_rejects_wrong_length() {
        assert!(ElevationGrid::from_columns(3, vec![0; 8]).is_err());
        assert!(ElevationGrid::from_columns(3, vec![0; 9]).is_ok());
    }

    #[test]
    fn test_constructors_reject_degenerate_posts() {
        for posts in [0, 1, MAX_POSTS + 1] {
            assert!(matches!(
                ElevationGrid::filled(posts, 0),
                Err(TerrainError::InvalidParameter { name: "posts", .. })
            ));
            assert!(ElevationGrid::from_fn(posts, |_, _| 0).is_err());
            assert!(ElevationGrid::from_columns(posts, vec![0; posts * posts]).is_err());
        }
        assert!(ElevationGrid::filled(MIN_POSTS, 0).is_ok());
    }

    #[test]
    fn test_column_major_layout() {
        let grid = ramp(4);
        assert_eq!(grid.post(2, 3), 23);
        assert_eq!(grid.column(1), &[10, 11, 12, 13]);
    }

    #[test]
    fn test_interpolate_exact_posts() {
        let grid = ramp(121);
        for (col, row) in [(0, 0), (37, 91), (120, 0), (0, 120), (120, 120), (60, 60)] {
            let fx = col as f64 / 120.0;
            let fy = row as f64 / 120.0;
            assert_eq!(grid.interpolate(fx, fy), grid.post(col, row) as f64);
        }
    }

    #[test]
    fn test_interpolate_midpoint() {
        let grid = ElevationGrid::from_columns(2, vec![0, 100, 200, 300]).unwrap();
        // SW=0, NW=100, SE=200, NE=300
        assert!((grid.interpolate(0.5, 0.5) - 150.0).abs() < 1e-9);
        assert!((grid.interpolate(0.5, 0.0) - 100.0).abs() < 1e-9);
        assert!((grid.interpolate(0.0, 0.5) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_interpolate_no_data_fallback_order() {
        // SW void: SE is the first valid corner
        let grid = ElevationGrid::from_columns(2, vec![NO_DATA, 100, 200, 300]).unwrap();
        assert_eq!(grid.interpolate(0.5, 0.5), 200.0);

        // SW and SE void: NW comes next
        let grid = ElevationGrid::from_columns(2, vec![NO_DATA, 100, NO_DATA, 300]).unwrap();
        assert_eq!(grid.interpolate(0.5, 0.5), 100.0);

        // Only NE valid
        let grid =
            ElevationGrid::from_columns(2, vec![NO_DATA, NO_DATA, NO_DATA, 300]).unwrap();
        assert_eq!(grid.interpolate(0.5, 0.5), 300.0);

        let grid = ElevationGrid::filled(2, NO_DATA).unwrap();
        assert_eq!(grid.interpolate(0.5, 0.5), NO_DATA_F64);
    }

    #[test]
    fn test_elevation_range_ignores_voids() {
        let grid = ElevationGrid::from_columns(2, vec![NO_DATA, -12, 40, 7]).unwrap();
        assert_eq!(grid.elevation_range(), Some((-12, 40)));
        assert_eq!(grid.void_count(), 1);
        assert_eq!(ElevationGrid::filled(3, NO_DATA).unwrap().elevation_range(), None);
    }
}
