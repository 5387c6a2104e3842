//! Scenario tests run against the public library API.

mod schedule_scenarios;
