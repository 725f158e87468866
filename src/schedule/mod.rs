pub mod generator;
pub mod recalculation;

pub use generator::ScheduleGenerator;
pub use recalculation::recalculate_schedule;
