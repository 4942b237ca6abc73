/// Three-level displacement storage for an FDTD grid.
///
/// Levels are allocated once. Advancing time only moves the index that says
/// which buffer is `next`, `current` or `previous`; no sample is copied.
///
///   next = levels[cursor]
///   current = levels[(cursor + 2) % 3]
///   previous = levels[(cursor + 1) % 3]

#[derive(Clone, Debug)]
pub struct StateLevels {
    levels: [Vec<f64>; 3],
    cursor: usize,
}

impl StateLevels {
    pub fn new(len: usize) -> Self {
        Self {
            levels: [vec![0.0; len], vec![0.0; len], vec![0.0; len]],
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.levels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn current(&self) -> &[f64] {
        &self.levels[(self.cursor + 2) % 3]
    }

    pub fn previous(&self) -> &[f64] {
        &self.levels[(self.cursor + 1) % 3]
    }

    pub fn next(&self) -> &[f64] {
        &self.levels[self.cursor]
    }

    /// Borrow all three levels at once: `(next, current, previous)`.
    pub fn split_mut(&mut self) -> (&mut [f64], &[f64], &[f64]) {
        let [a, b, c] = &mut self.levels;
        match self.cursor {
            0 => (a.as_mut_slice(), c.as_slice(), b.as_slice()),
            1 => (b.as_mut_slice(), a.as_slice(), c.as_slice()),
            _ => (c.as_mut_slice(), b.as_slice(), a.as_slice()),
        }
    }

    /// Write one point of both the current and previous level.
    ///
    /// Equal values at both levels mean zero initial velocity there.
    pub fn impose(&mut self, index: usize, value: f64) {
        let cur = (self.cursor + 2) % 3;
        let prev = (self.cursor + 1) % 3;
        self.levels[cur][index] = value;
        self.levels[prev][index] = value;
    }

    /// next -> current -> previous. The old previous buffer becomes the new next.
    pub fn rotate(&mut self) {
        self.cursor = (self.cursor + 1) % 3;
    }

    pub fn clear(&mut self) {
        for level in &mut self.levels {
            level.fill(0.0);
        }
    }
}
