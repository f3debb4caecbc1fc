// Integration tests against the assembled router

#[path = "../common/mod.rs"]
mod common;

mod test_admission_pipeline;
mod test_concurrency;
mod test_operational_endpoints;
