//! Shared test harness modules for the venue sync CLI.

use super::*;

mod helpers;
mod status_steps;
