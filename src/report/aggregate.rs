use crate::runner::RunOutcome;

/// Outcomes of all modules of one run, in the order they were invoked.
#[derive(Debug, Clone, Default)]
pub struct AggregatedReport {
    outcomes: Vec<RunOutcome>,
}

impl AggregatedReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, outcome: RunOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn outcomes(&self) -> &[RunOutcome] {
        &self.outcomes
    }

    /// Outcome of the module `name`.
    pub fn get(&self, name: &str) -> Option<&RunOutcome> {
        self.outcomes.iter().find(|outcome| outcome.module == name)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.success).count()
    }

    pub fn failure_count(&self) -> usize {
        self.len() - self.success_count()
    }

    /// `N completed`, followed by `, M failed` if anything failed.
    pub fn summary_line(&self) -> String {
        match self.failure_count() {
            0 => format!("{} completed", self.success_count()),
            failed => format!("{} completed, {failed} failed", self.success_count()),
        }
    }
}

impl FromIterator<RunOutcome> for AggregatedReport {
    fn from_iter<I: IntoIterator<Item = RunOutcome>>(iter: I) -> Self {
        Self {
            outcomes: iter.into_iter().collect(),
        }
    }
}

/// Collects the outcomes of one run, keeping their order.
pub fn aggregate(outcomes: impl IntoIterator<Item = RunOutcome>) -> AggregatedReport {
    outcomes.into_iter().collect()
}
