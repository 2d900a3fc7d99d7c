/*
 * Boot-time test menu
 *
 * Entry point for the kernel's runtime self-tests. There is no hosted
 * `cargo test` here, so these just run inline during boot (see
 * kstart in main.rs) and panic through the normal panic handler on
 * assertion failure.
 */

pub fn run_all() {
    log::info!("tests: running scheduler self-tests...");
    crate::scheduler::sched_tests::run_all();
}
