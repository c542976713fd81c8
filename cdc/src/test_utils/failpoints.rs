use fail::FailScenario;

/// Configures failpoints for the lifetime of the scenario and switches them off on drop.
pub struct CustomFailScenario<'a> {
    _scenario: FailScenario<'a>,
    failpoints: Vec<String>,
}

impl<'a> CustomFailScenario<'a> {
    /// Configures every `(failpoint, action)` pair, e.g. `("reconcile.before_commit", "return")`.
    pub fn setup(failpoints: &[(&str, &str)]) -> CustomFailScenario<'a> {
        let scenario = FailScenario::setup();

        for (failpoint, action) in failpoints {
            fail::cfg(*failpoint, action).expect("failed to configure failpoint");
        }

        Self {
            _scenario: scenario,
            failpoints: failpoints
                .iter()
                .map(|(failpoint, _)| failpoint.to_string())
                .collect(),
        }
    }

    pub fn teardown(self) {
        drop(self);
    }
}

impl Drop for CustomFailScenario<'_> {
    fn drop(&mut self) {
        for failpoint in &self.failpoints {
            fail::remove(failpoint);
        }
    }
}
