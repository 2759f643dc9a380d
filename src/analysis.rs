//! Operator performance summary printed at the end of a run.

use std::fmt;

use crate::{
    operator::{AcceptanceDiagnosis, Operator},
    schedule::OperatorSchedule,
};

impl fmt::Display for AcceptanceDiagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AcceptanceDiagnosis::Low => "low",
            AcceptanceDiagnosis::SlightlyLow => "slightly low",
            AcceptanceDiagnosis::Good => "good",
            AcceptanceDiagnosis::SlightlyHigh => "slightly high",
            AcceptanceDiagnosis::High => "high",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperatorRow {
    pub name: String,
    pub tuning: Option<(&'static str, f64)>,
    pub count: u64,
    pub failures: u64,
    pub time_ms: f64,
    pub acceptance: f64,
    pub diagnosis: Option<AcceptanceDiagnosis>,
}

impl OperatorRow {
    fn new<S: ?Sized>(operator: &dyn Operator<S>) -> Self {
        let core = operator.core();
        let count = core.operation_count();
        Self {
            name: core.name().to_string(),
            tuning: operator.tuning(),
            count,
            failures: core.fail_count(),
            time_ms: core.evaluation_time().as_secs_f64() * 1000.0,
            acceptance: core.acceptance_probability(),
            // nothing to judge before the first outcome
            diagnosis: (count > 0).then(|| core.diagnosis()),
        }
    }

    pub fn time_per_operation_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.time_ms / self.count as f64
        }
    }
}

/// One row per operator, in schedule order.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorAnalysis {
    pub rows: Vec<OperatorRow>,
}

impl OperatorAnalysis {
    pub fn new<S: ?Sized>(schedule: &OperatorSchedule<S>) -> Self {
        Self {
            rows: schedule.operators().map(|op| OperatorRow::new(op)).collect(),
        }
    }
}

impl fmt::Display for OperatorAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .rows
            .iter()
            .map(|row| row.name.len())
            .max()
            .unwrap_or(0)
            .max("Operator".len());
        writeln!(
            f,
            "{:<width$}  {:>10}  {:>10}  {:>8}  {:>10}  {:>10}  {:>10}  Diagnosis",
            "Operator",
            "Tuning",
            "Count",
            "Failed",
            "Time",
            "Time/Op",
            "Pr(accept)",
            width = width
        )?;
        for row in &self.rows {
            let tuning = match row.tuning {
                Some((_, value)) => format!("{:.4}", value),
                None => "-".to_string(),
            };
            let diagnosis = match row.diagnosis {
                Some(d) => d.to_string(),
                None => "-".to_string(),
            };
            writeln!(
                f,
                "{:<width$}  {:>10}  {:>10}  {:>8}  {:>10.1}  {:>10.4}  {:>10.4}  {}",
                row.name,
                tuning,
                row.count,
                row.failures,
                row.time_ms,
                row.time_per_operation_ms(),
                row.acceptance,
                diagnosis,
                width = width
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::ModelGraph,
        operators::ScaleOperator,
        parameter::Parameter,
        schedule::test_operators::NullOperator,
    };

    #[test]
    fn table_lists_every_operator() {
        let mut graph = ModelGraph::new();
        let id = graph.add_parameter(Parameter::scalar("kappa", 2.0));
        let mut schedule = OperatorSchedule::new();
        schedule
            .add_operator(Box::new(ScaleOperator::new(&graph, id, 0.75, 3.0).unwrap()))
            .unwrap();
        schedule
            .add_operator(NullOperator::boxed("null", 1.0))
            .unwrap();
        {
            let core = schedule.operator_mut(0).core_mut();
            core.record_accept(0.5);
            core.record_reject();
            core.record_reject();
            core.record_reject();
            core.record_failure();
        }

        let analysis = OperatorAnalysis::new(&schedule);
        assert_eq!(analysis.rows.len(), 2);
        let scale = &analysis.rows[0];
        assert_eq!(scale.count, 4);
        assert_eq!(scale.failures, 1);
        assert_eq!(scale.acceptance, 0.25);
        assert_eq!(scale.diagnosis, Some(AcceptanceDiagnosis::Good));
        assert_eq!(analysis.rows[1].diagnosis, None);

        let text = analysis.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Operator"));
        assert!(lines[1].starts_with("scale(kappa)"));
        assert!(lines[1].contains("0.7500"));
        assert!(lines[1].ends_with("good"));
        assert!(lines[2].ends_with("-"));
    }
}
