use std::fmt;
use std::ops::AddAssign;

/// Counters collected by one machine, merged across attempts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Statistics {
    pub instructions: u64,
    pub calls: u64,
    pub choice_points: u64,
    pub backtracks: u64,
    pub solutions: u64,
    pub facts_asserted: u64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, other: &Statistics) {
        *self += *other;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl AddAssign for Statistics {
    fn add_assign(&mut self, other: Statistics) {
        self.instructions += other.instructions;
        self.calls += other.calls;
        self.choice_points += other.choice_points;
        self.backtracks += other.backtracks;
        self.solutions += other.solutions;
        self.facts_asserted += other.facts_asserted;
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  instructions:   {:>10}", self.instructions)?;
        writeln!(f, "  calls:          {:>10}", self.calls)?;
        writeln!(f, "  choice points:  {:>10}", self.choice_points)?;
        writeln!(f, "  backtracks:     {:>10}", self.backtracks)?;
        writeln!(f, "  solutions:      {:>10}", self.solutions)?;
        write!(f, "  facts asserted: {:>10}", self.facts_asserted)
    }
}

#[cfg(test)]
mod tests {
    use super::Statistics;

    #[test]
    fn counters_merge() {
        let mut total = Statistics::new();
        let attempt = Statistics { instructions: 10, backtracks: 2, ..Statistics::default() };
        total.merge(&attempt);
        total.merge(&attempt);
        assert_eq!(total.instructions, 20);
        assert_eq!(total.backtracks, 4);
        total.clear();
        assert_eq!(total, Statistics::default());
    }
}
