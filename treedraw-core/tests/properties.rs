//! Property tests for cut partitioning and single-pass scanning.

use proptest::{collection::vec, prelude::*, test_runner::Config as ProptestConfig};
use treedraw_core::{
    JobBuilder,
    memory::{MemoryOpener, MemorySink, MemoryTree},
    run_job,
};
use treedraw_test_support::proptest_profile::property_cases;

fn tree(values: &[f64]) -> MemoryTree {
    MemoryTree::new("t", ["x"]).with_rows(values.iter().map(|&x| [Some(x)]))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(property_cases(64)))]

    #[test]
    fn cut_and_complement_partition_the_records(
        values in vec(-50.0_f64..50.0, 0..300),
        threshold in -60.0_f64..60.0,
    ) {
        let opener = MemoryOpener::new().with_file("x.mem", [tree(&values)]);
        let sink = MemorySink::new();
        let job = JobBuilder::new()
            .with_output("out.mem")
            .with_input("x.mem")
            .with_histogram("all(20,-50,50)=x")
            .with_histogram(format!("above(20,-50,50)=x if x > {threshold}"))
            .with_histogram(format!("rest(20,-50,50)=x if !(x > {threshold})"))
            .build()
            .expect("job builds");
        run_job(job, &opener, &sink).expect("run succeeds");

        let artifact = sink.artifact("out.mem").expect("artifact stored");
        let entries = |name: &str| artifact.histogram(name).expect("histogram stored").entries();
        let expected = values.iter().filter(|&&x| x > threshold).count() as u64;
        prop_assert_eq!(entries("above"), expected);
        prop_assert_eq!(entries("above") + entries("rest"), entries("all"));
        prop_assert_eq!(entries("all"), values.len() as u64);
    }

    #[test]
    fn each_file_is_scanned_once(
        files in vec(vec(-5.0_f64..5.0, 0..20), 1..5),
        specs in 1_usize..9,
    ) {
        let opener = files.iter().enumerate().fold(MemoryOpener::new(), |opener, (index, values)| {
            opener.with_file(format!("f{index}.mem"), [tree(values)])
        });
        let sink = MemorySink::new();
        let job = JobBuilder::new()
            .with_output("out.mem")
            .with_inputs((0..files.len()).map(|index| format!("f{index}.mem")))
            .with_histograms((0..specs).map(|index| format!("h{index}=x * {index} if x > -{index}")))
            .build()
            .expect("job builds");
        let summary = run_job(job, &opener, &sink).expect("run succeeds");

        prop_assert_eq!(summary.histograms.len(), specs);
        prop_assert_eq!(summary.records, files.iter().map(Vec::len).sum::<usize>() as u64);
        for index in 0..files.len() {
            prop_assert_eq!(opener.scans(format!("f{index}.mem")), 1);
        }
    }
}
