pub mod admin;
pub mod cron_utils;
pub mod engine;
pub mod interval_scanner;
pub mod rule_scanner;
pub mod scan;
pub mod schedule_scanner;
pub mod trigger;

pub use admin::ScheduleAdminService;
pub use cron_utils::{CronCache, CronScheduler};
pub use engine::SchedulingEngine;
pub use interval_scanner::IntervalScanner;
pub use rule_scanner::RuleScanner;
pub use scan::{FireOutcome, LoopKind, ScanReport};
pub use schedule_scanner::ScheduleScanner;
pub use trigger::TriggerEvaluator;
