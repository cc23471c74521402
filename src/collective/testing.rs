//! Running tests of the MPI backend as real multi-process jobs.
//!
//! A test declared with [`mpi_test!`](crate::mpi_test) is split into two: a
//! launcher that cargo runs normally, and an ignored worker holding the body. The
//! launcher starts `mpirun`, which runs `cargo test` on every rank with the `mpi`
//! feature on and filters it down to the worker.

/// The suffix that marks the worker half of an MPI test.
const WORKER_SUFFIX: &str = "_on_ranks";

/// Turns `module_path!()` of a test module and the worker's name into the filter
/// that `cargo test --exact` matches, which starts below the crate root.
pub(crate) fn worker_filter(module_path: &str, test_name: &str) -> String {
    match module_path.split_once("::") {
        Some((_crate_name, module)) => format!("{module}::{test_name}{WORKER_SUFFIX}"),
        None => format!("{test_name}{WORKER_SUFFIX}"),
    }
}

/// Runs the worker matching `filter` on `ranks` processes and fails if any rank
/// fails.
pub(crate) fn launch(filter: &str, ranks: usize) {
    let status = std::process::Command::new("mpirun")
        .args(["-n", &ranks.to_string(), "--allow-run-as-root"])
        .args(["cargo", "test", "--features", "mpi", filter])
        .args(["--", "--ignored", "--exact"])
        .status()
        .unwrap_or_else(|err| panic!("could not launch mpirun: {err}"));
    assert!(status.success(), "{filter} failed on {ranks} ranks: {status}");
}

/// Declares a test whose body runs on `$ranks` MPI processes.
///
/// Only usable in test modules compiled with the `mpi` feature, and `mpirun` has to
/// be on the `PATH`. The body calls `mpi::initialize()` itself, like any MPI
/// program.
///
/// ```ignore
/// mpi_test!(4, fn test_broadcast() {
///     let universe = mpi::initialize().unwrap();
///     // ...
/// });
/// ```
#[macro_export]
macro_rules! mpi_test {
    ($ranks:expr, fn $name:ident () $body:block) => {
        paste::paste! {
            #[test]
            fn $name() {
                let filter =
                    $crate::collective::testing::worker_filter(module_path!(), stringify!($name));
                $crate::collective::testing::launch(&filter, $ranks);
            }

            #[test]
            #[ignore = "started by mpirun"]
            fn [<$name _on_ranks>]() $body
        }
    };
}

#[cfg(test)]
mod tests {
    use super::worker_filter;

    #[test]
    fn test_worker_filter() {
        assert_eq!(worker_filter("tncplan", "reduce"), "reduce_on_ranks");
        assert_eq!(
            worker_filter("tncplan::collective::mpi_backend::tests", "reduce"),
            "collective::mpi_backend::tests::reduce_on_ranks"
        );
    }
}
