//! Training metrics logging

mod logger;

pub use logger::{
    ConsoleLogger, CsvLogger, MetricsLogger, MultiLogger, RoundSnapshot, StepSnapshot,
    UpdateSnapshot,
};
