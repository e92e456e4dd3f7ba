use serde::{Deserialize, Serialize};

/// Isolation windows of a data-independent acquisition scheme, as half-open
/// `[low, high)` precursor m/z intervals.
///
/// Windows must be sorted by lower bound and must not overlap. This is
/// checked once by [`SwathWindows::new`], not on every lookup.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SwathWindows(Vec<(f64, f64)>);

impl SwathWindows {
    /// Returns `None` if the windows are unsorted, overlapping or empty
    /// intervals
    pub fn new(windows: Vec<(f64, f64)>) -> Option<Self> {
        let valid = windows.iter().all(|(lo, hi)| lo < hi)
            && windows.windows(2).all(|w| w[0].1 <= w[1].0);
        valid.then_some(Self(windows))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn windows(&self) -> &[(f64, f64)] {
        &self.0
    }

    /// Index of the window containing `precursor_mz`
    pub fn window_index(&self, precursor_mz: f64) -> Option<usize> {
        // First window whose upper bound lies above the precursor
        let idx = self.0.partition_point(|(_, hi)| *hi <= precursor_mz);
        match self.0.get(idx) {
            Some((lo, _)) if *lo <= precursor_mz => Some(idx),
            _ => None,
        }
    }

    /// Is `product_mz` inside the window that contains `precursor_mz`?
    pub fn is_in_window(&self, precursor_mz: f64, product_mz: f64) -> bool {
        match self.window_index(precursor_mz) {
            Some(idx) => {
                let (lo, hi) = self.0[idx];
                product_mz >= lo && product_mz < hi
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod test {
    use quickcheck_macros::quickcheck;

    use super::*;

    fn windows() -> SwathWindows {
        SwathWindows::new(vec![(400.0, 425.0), (425.0, 450.0), (475.0, 500.0)]).unwrap()
    }

    #[test]
    fn validation() {
        assert!(SwathWindows::new(vec![]).is_some());
        assert!(SwathWindows::new(vec![(400.0, 400.0)]).is_none());
        assert!(SwathWindows::new(vec![(400.0, 450.0), (449.0, 500.0)]).is_none());
        assert!(SwathWindows::new(vec![(450.0, 500.0), (400.0, 450.0)]).is_none());
    }

    #[test]
    fn lookup() {
        let w = windows();
        assert_eq!(w.window_index(399.99), None);
        assert_eq!(w.window_index(400.0), Some(0));
        assert_eq!(w.window_index(424.99), Some(0));
        assert_eq!(w.window_index(425.0), Some(1));
        assert_eq!(w.window_index(460.0), None);
        assert_eq!(w.window_index(499.0), Some(2));
        assert_eq!(w.window_index(500.0), None);
        assert_eq!(SwathWindows::default().window_index(400.0), None);
    }

    #[test]
    fn bounds() {
        let w = windows();
        assert!(w.is_in_window(410.0, 400.0));
        assert!(!w.is_in_window(410.0, 425.0));
        assert!(w.is_in_window(430.0, 425.0));
        assert!(!w.is_in_window(460.0, 460.0));
        assert!(!w.is_in_window(410.0, 800.0));
    }

    #[quickcheck]
    fn in_window_iff_same_interval(precursor: u16, product: u16) -> bool {
        let w = windows();
        let precursor = 350.0 + (precursor % 200) as f64;
        let product = 350.0 + (product % 200) as f64;
        let expected = w
            .windows()
            .iter()
            .any(|(lo, hi)| (*lo..*hi).contains(&precursor) && (*lo..*hi).contains(&product));
        w.is_in_window(precursor, product) == expected
    }
}
