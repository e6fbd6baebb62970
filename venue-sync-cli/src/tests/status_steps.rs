//! Behaviour-driven step definitions driving the status command scenarios.

use super::helpers::DataDirFixture;
use super::*;
use crate::config::ARG_DATA_DIR;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::cell::{Cell, RefCell};

/// Aggregates status scenario state so each step takes a single world argument.
struct StatusWorld {
    fixture: DataDirFixture,
    configured: Cell<bool>,
    result: RefCell<Option<Result<String, CliError>>>,
}

impl StatusWorld {
    fn new() -> Self {
        Self {
            fixture: DataDirFixture::new(),
            configured: Cell::new(true),
            result: RefCell::new(None),
        }
    }

    fn output(&self) -> String {
        let borrowed = self.result.borrow();
        match borrowed.as_ref().expect("result recorded") {
            Ok(output) => output.clone(),
            Err(err) => panic!("expected success, found {err:?}"),
        }
    }
}

#[fixture]
fn world() -> StatusWorld {
    StatusWorld::new()
}

#[given("an empty data directory")]
fn empty_data_dir(#[from(world)] world: &StatusWorld) {
    assert!(world.fixture.root().exists());
}

#[given("a data directory synchronised to sequence 100 with 2 venues")]
fn synchronised_data_dir(#[from(world)] world: &StatusWorld) {
    world.fixture.synchronise(100, 2);
}

#[given("no data directory is configured")]
fn no_data_dir(#[from(world)] world: &StatusWorld) {
    world.configured.set(false);
}

#[when("I run the status command")]
fn run_status(#[from(world)] world: &StatusWorld) {
    let mut invocation = vec!["venue-sync".to_owned(), "status".to_owned()];
    if world.configured.get() {
        invocation.extend([
            format!("--{ARG_DATA_DIR}"),
            world.fixture.root().as_str().to_owned(),
        ]);
    }
    let mut buffer = Vec::new();
    let outcome = Cli::try_parse_from(invocation)
        .map_err(CliError::ArgumentParsing)
        .and_then(|cli| dispatch(cli.command, &mut buffer))
        .map(|()| String::from_utf8_lossy(&buffer).into_owned());
    world.result.replace(Some(outcome));
}

#[then("the status reports no consumed sequence")]
fn reports_no_sequence(#[from(world)] world: &StatusWorld) {
    assert!(world.output().contains("consumed sequence: none"));
}

#[then("the status reports consumed sequence 100")]
fn reports_sequence(#[from(world)] world: &StatusWorld) {
    assert!(world.output().contains("consumed sequence: 100 "));
}

#[then("the status reports 0 cached venues")]
fn reports_no_venues(#[from(world)] world: &StatusWorld) {
    assert!(world.output().contains("cached venues: 0\n"));
}

#[then("the status reports 2 cached venues")]
fn reports_two_venues(#[from(world)] world: &StatusWorld) {
    assert!(world.output().contains("cached venues: 2\n"));
}

#[then("the status names sequence 100 as the last applied")]
fn reports_last_applied(#[from(world)] world: &StatusWorld) {
    assert!(world.output().contains("last applied: sequence 100 "));
}

#[then("the CLI reports that the \"data-dir\" flag is missing")]
fn reports_missing_data_dir(#[from(world)] world: &StatusWorld) {
    let borrowed = world.result.borrow();
    let error = borrowed
        .as_ref()
        .expect("result recorded")
        .as_ref()
        .expect_err("expected error");
    match error {
        CliError::MissingArgument { field, .. } => assert_eq!(*field, ARG_DATA_DIR),
        other => panic!("unexpected error {other:?}"),
    }
}

macro_rules! register_status_scenario {
    ($fn_name:ident, $scenario_title:literal) => {
        #[scenario(path = "tests/features/status_command.feature", name = $scenario_title)]
        fn $fn_name(#[from(world)] world: StatusWorld) {
            let _ = world;
        }
    };
}

register_status_scenario!(untouched_data_dir, "reporting an untouched data directory");
register_status_scenario!(synchronised_data_dir_status, "reporting a synchronised data directory");
register_status_scenario!(rejecting_missing_data_dir, "rejecting a missing data directory");
