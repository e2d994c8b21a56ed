//! Per-record evaluation of every histogram spec of a job.

use crate::{
    expr::{BoundExpression, BranchTable, is_truthy},
    histogram::{Histogram, HistogramFiller},
    spec::HistogramSpec,
};

struct BoundSpec {
    x: BoundExpression,
    y: Option<BoundExpression>,
    cut: Option<BoundExpression>,
    filler: HistogramFiller,
}

impl BoundSpec {
    fn record(&mut self, values: &[Option<f64>]) {
        let weight = match &self.cut {
            None => 1.0,
            Some(cut) => match cut.eval(values) {
                Some(weight) if is_truthy(weight) => weight,
                _ => return,
            },
        };
        let Some(x) = self.x.eval(values) else {
            return;
        };
        let y = match &self.y {
            None => None,
            Some(expr) => match expr.eval(values) {
                Some(y) => Some(y),
                None => return,
            },
        };
        self.filler.fill(x, y, weight);
    }
}

/// Bound expressions and fillers for every spec, sharing one branch table.
///
/// The branch table fixes the record layout: a record passed to
/// [`FillPlan::record`] holds one value per name in [`FillPlan::branches`].
pub(crate) struct FillPlan {
    table: BranchTable,
    specs: Vec<BoundSpec>,
}

impl FillPlan {
    pub(crate) fn new(specs: &[HistogramSpec]) -> Self {
        let mut table = BranchTable::new();
        let specs = specs
            .iter()
            .map(|spec| BoundSpec {
                x: spec.x().bind(&mut table),
                y: spec.y().map(|expr| expr.bind(&mut table)),
                cut: spec.cut().map(|expr| expr.bind(&mut table)),
                filler: HistogramFiller::new(spec.name(), spec.binning()),
            })
            .collect();
        Self { table, specs }
    }

    /// The union of branches read by any spec, in slot order.
    pub(crate) fn branches(&self) -> &[String] {
        self.table.names()
    }

    pub(crate) fn record(&mut self, values: &[Option<f64>]) {
        for spec in &mut self.specs {
            spec.record(values);
        }
    }

    pub(crate) fn finish(self) -> Vec<Histogram> {
        self.specs
            .into_iter()
            .map(|spec| spec.filler.finish())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    fn plan(texts: &[&str]) -> FillPlan {
        let specs: Vec<HistogramSpec> = texts
            .iter()
            .map(|text| HistogramSpec::parse(text).expect("valid spec"))
            .collect();
        FillPlan::new(&specs)
    }

    #[rstest]
    fn branch_union_is_shared() {
        let plan = plan(&["a=px", "b=px:py if e > 0", "c=e"]);
        assert_eq!(plan.branches(), ["px", "py", "e"]);
    }

    #[rstest]
    fn cut_value_is_the_weight() {
        let mut plan = plan(&["h(2,0,2)=x if w"]);
        plan.record(&[Some(0.5), Some(2.5)]);
        plan.record(&[Some(0.5), Some(0.0)]);
        plan.record(&[Some(1.5), Some(f64::NAN)]);
        let histograms = plan.finish();
        assert_eq!(histograms[0].entries(), 1);
        assert_eq!(histograms[0].content(1, 0), 2.5);
        assert_eq!(histograms[0].sumw2()[1], 6.25);
    }

    #[rstest]
    fn null_branch_only_skips_affected_specs() {
        let mut plan = plan(&["a(2,0,2)=x", "b(2,0,2)=y", "c(2,0,2,2,0,2)=x:y"]);
        plan.record(&[Some(0.5), None]);
        plan.record(&[None, Some(1.5)]);
        let entries: Vec<u64> = plan.finish().iter().map(Histogram::entries).collect();
        assert_eq!(entries, [1, 1, 0]);
    }

    #[rstest]
    fn null_cut_rejects_record() {
        let mut plan = plan(&["h(2,0,2)=x if q > 0"]);
        plan.record(&[Some(0.5), None]);
        assert_eq!(plan.finish()[0].entries(), 0);
    }
}
