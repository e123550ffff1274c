//! Mixed-radix odometer over variable domains.
//!
//! Digit 0 is the least significant and turns fastest. [`Odometer::skip_past`]
//! jumps over every remaining combination that shares the digits at and above a
//! position, which is how the grounder prunes tautological sub-products.

#[derive(Debug, Clone)]
pub struct Odometer {
    digits: Vec<usize>,
    radices: Vec<usize>,
    exhausted: bool,
}

impl Odometer {
    /// Odometer over `radices` (one per digit, least significant first).
    /// Any zero radix makes the product empty.
    pub fn new(radices: Vec<usize>) -> Self {
        let exhausted = radices.contains(&0);
        Self {
            digits: vec![0; radices.len()],
            radices,
            exhausted,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Current combination, or `None` once exhausted.
    pub fn current(&self) -> Option<&[usize]> {
        (!self.exhausted).then_some(self.digits.as_slice())
    }

    /// Total number of combinations.
    pub fn size(&self) -> u128 {
        self.radices.iter().map(|&r| r as u128).product()
    }

    /// Step to the next combination.
    pub fn advance(&mut self) {
        self.skip_past(0);
    }

    /// Leave every combination whose digits at positions `>= k` equal the
    /// current ones: clear digits below `k`, then increment digit `k` with carry.
    /// `k >= len` exhausts the odometer.
    pub fn skip_past(&mut self, k: usize) {
        if self.exhausted {
            return;
        }
        for digit in self.digits.iter_mut().take(k) {
            *digit = 0;
        }
        let mut pos = k;
        while pos < self.digits.len() {
            self.digits[pos] += 1;
            if self.digits[pos] < self.radices[pos] {
                return;
            }
            self.digits[pos] = 0;
            pos += 1;
        }
        self.exhausted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(mut odo: Odometer) -> Vec<Vec<usize>> {
        let mut out = Vec::new();
        while let Some(cur) = odo.current() {
            out.push(cur.to_vec());
            odo.advance();
        }
        out
    }

    #[test]
    fn enumerates_full_product() {
        let all = collect(Odometer::new(vec![2, 3]));
        assert_eq!(all.len(), 6);
        assert_eq!(all[0], vec![0, 0]);
        assert_eq!(all[1], vec![1, 0]);
        assert_eq!(all[2], vec![0, 1]);
        assert_eq!(all[5], vec![1, 2]);
    }

    #[test]
    fn no_digits_yields_single_empty_combination() {
        assert_eq!(collect(Odometer::new(vec![])), vec![Vec::<usize>::new()]);
    }

    #[test]
    fn zero_radix_is_empty() {
        let odo = Odometer::new(vec![3, 0]);
        assert!(odo.is_exhausted());
        assert_eq!(odo.size(), 0);
    }

    #[test]
    fn skip_past_jumps_over_shared_prefix() {
        let mut odo = Odometer::new(vec![3, 3, 2]);
        odo.advance(); // [1,0,0]
        odo.skip_past(1); // skip every [*,0,0]
        assert_eq!(odo.current(), Some(&[0, 1, 0][..]));
        odo.skip_past(2); // skip every [*,*,0]
        assert_eq!(odo.current(), Some(&[0, 0, 1][..]));
        odo.skip_past(2);
        assert!(odo.is_exhausted());
    }

    #[test]
    fn skip_past_beyond_top_exhausts() {
        let mut odo = Odometer::new(vec![4]);
        odo.skip_past(1);
        assert!(odo.current().is_none());
    }
}
