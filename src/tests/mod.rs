//! Scenario tests driving the display state machine with test doubles.

mod clock_tests;
